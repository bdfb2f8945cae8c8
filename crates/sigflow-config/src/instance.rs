//! Component instance entries.

use serde::{Deserialize, Serialize};
use sigflow_core::ConfigValue;

/// One component instance in a pipeline.
///
/// Parameters live in a TOML table. Keys may be nested tables or dotted
/// literal keys; both `writer.level = "pcm"` and `[params.writer]
/// level = "pcm"` are found by [`InstanceEntry::get`] as `"writer.level"`.
///
/// # Example
///
/// ```rust
/// use sigflow_config::InstanceEntry;
///
/// let entry = InstanceEntry::new("gen", "signal_generator")
///     .with_param("frames", 480)
///     .with_param("writer.level", "pcm");
///
/// assert_eq!(entry.component_type, "signal_generator");
/// assert_eq!(entry.get("writer.level").and_then(|v| v.as_str()), Some("pcm"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceEntry {
    /// Unique instance name.
    pub name: String,

    /// Component type name in the registry.
    #[serde(rename = "type")]
    pub component_type: String,

    /// Raw thread id: `-2` never ticked, `-1` default thread.
    #[serde(default = "default_thread_id")]
    pub thread_id: i64,

    /// Instance parameters.
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub params: toml::Table,
}

fn default_thread_id() -> i64 {
    -1
}

impl InstanceEntry {
    /// Entry on the default thread with no parameters.
    pub fn new(name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: component_type.into(),
            thread_id: default_thread_id(),
            params: toml::Table::new(),
        }
    }

    /// Set the raw thread id.
    pub fn with_thread_id(mut self, thread_id: i64) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Add a parameter. Dotted keys create nested tables.
    pub fn with_param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.set_param(key, value);
        self
    }

    /// Set a parameter. Dotted keys create nested tables.
    pub fn set_param(&mut self, key: &str, value: impl Into<toml::Value>) {
        let mut parts: Vec<&str> = key.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };
        let mut table = &mut self.params;
        for part in parts {
            let slot = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !slot.is_table() {
                *slot = toml::Value::Table(toml::Table::new());
            }
            let toml::Value::Table(next) = slot else {
                return;
            };
            table = next;
        }
        table.insert(last.to_string(), value.into());
    }

    /// Look up a parameter by (possibly dotted) key.
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        if let Some(v) = self.params.get(key) {
            return Some(v);
        }
        let mut parts = key.split('.');
        let mut value = self.params.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    /// Parameter converted to a [`ConfigValue`]. Arrays and tables have no
    /// scalar view.
    pub fn value(&self, key: &str) -> Option<ConfigValue> {
        to_config_value(self.get(key)?)
    }
}

/// Scalar view of a TOML value.
pub(crate) fn to_config_value(value: &toml::Value) -> Option<ConfigValue> {
    match value {
        toml::Value::Integer(v) => Some(ConfigValue::Int(*v)),
        toml::Value::Float(v) => Some(ConfigValue::Double(*v)),
        toml::Value::Boolean(v) => Some(ConfigValue::Bool(*v)),
        toml::Value::String(s) => Some(ConfigValue::Str(s.clone())),
        toml::Value::Datetime(d) => Some(ConfigValue::Str(d.to_string())),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_thread() {
        let e = InstanceEntry::new("a", "t");
        assert_eq!(e.thread_id, -1);
        assert!(e.params.is_empty());
    }

    #[test]
    fn dotted_keys_nest() {
        let e = InstanceEntry::new("a", "t")
            .with_param("writer.level", "pcm")
            .with_param("writer.capacity", 64);
        assert!(e.params["writer"].is_table());
        assert_eq!(e.get("writer.capacity").and_then(toml::Value::as_integer), Some(64));
    }

    #[test]
    fn literal_dotted_key_wins() {
        let mut e = InstanceEntry::new("a", "t");
        e.params
            .insert("reader.level".to_string(), toml::Value::from("literal"));
        assert_eq!(e.get("reader.level").and_then(|v| v.as_str()), Some("literal"));
    }

    #[test]
    fn missing_key_is_none() {
        let e = InstanceEntry::new("a", "t").with_param("x", 1);
        assert!(e.get("y").is_none());
        assert!(e.get("x.y").is_none());
    }

    #[test]
    fn scalar_views() {
        let e = InstanceEntry::new("a", "t")
            .with_param("i", 3)
            .with_param("f", 0.5)
            .with_param("b", true)
            .with_param("list", vec![1, 2]);
        assert_eq!(e.value("i"), Some(ConfigValue::Int(3)));
        assert_eq!(e.value("f"), Some(ConfigValue::Double(0.5)));
        assert_eq!(e.value("b"), Some(ConfigValue::Bool(true)));
        assert_eq!(e.value("list"), None);
    }
}
