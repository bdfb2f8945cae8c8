//! Typed configuration lookup for component instances.
//!
//! The core never parses configuration syntax. It asks a [`ConfigSource`]
//! for values by instance name and key; `sigflow-config` implements the trait
//! on top of TOML pipeline files, [`MapConfig`] covers tests and programmatic
//! assembly.
//!
//! Components see their own scope through [`InstanceConfig`]:
//!
//! ```rust
//! use sigflow_core::{ConfigValue, InstanceConfig, MapConfig};
//!
//! let mut cfg = MapConfig::new();
//! cfg.set("gen", "frames", ConfigValue::Int(480));
//! cfg.set("gen", "writer.level", ConfigValue::from("pcm"));
//!
//! let scope = InstanceConfig::new("gen", &cfg);
//! assert_eq!(scope.require_int("frames").unwrap(), 480);
//! assert_eq!(scope.string_or("writer.level", "out"), "pcm");
//! assert_eq!(scope.double_or("gain", 1.0), 1.0);
//! ```

use std::collections::HashMap;

use crate::error::ComponentError;

/// Source of typed configuration values, keyed by instance and key.
pub trait ConfigSource: Send + Sync {
    /// Integer value; booleans read as 0 or 1.
    fn get_int(&self, instance: &str, key: &str) -> Option<i64>;

    /// Floating point value; integers are widened.
    fn get_double(&self, instance: &str, key: &str) -> Option<f64>;

    /// String value.
    fn get_string(&self, instance: &str, key: &str) -> Option<String>;

    /// Returns `true` if the key exists in the instance scope.
    fn is_set(&self, instance: &str, key: &str) -> bool;
}

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Double(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl ConfigValue {
    /// Integer view of the value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            ConfigValue::Bool(b) => Some(i64::from(*b)),
            ConfigValue::Str(s) => s.trim().parse().ok(),
            ConfigValue::Double(_) => None,
        }
    }

    /// Floating point view of the value.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            ConfigValue::Double(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            ConfigValue::Str(s) => s.trim().parse().ok(),
            ConfigValue::Bool(_) => None,
        }
    }

    /// String view of the value.
    pub fn as_string(&self) -> String {
        match self {
            ConfigValue::Str(s) => s.clone(),
            ConfigValue::Int(v) => v.to_string(),
            ConfigValue::Double(v) => v.to_string(),
            ConfigValue::Bool(b) => b.to_string(),
        }
    }
}

/// In-memory [`ConfigSource`].
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<(String, String), ConfigValue>,
}

impl MapConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` for `instance`, replacing any previous value.
    pub fn set(&mut self, instance: &str, key: &str, value: impl Into<ConfigValue>) -> &mut Self {
        self.values
            .insert((instance.to_string(), key.to_string()), value.into());
        self
    }

    fn get(&self, instance: &str, key: &str) -> Option<&ConfigValue> {
        self.values.get(&(instance.to_string(), key.to_string()))
    }
}

impl ConfigSource for MapConfig {
    fn get_int(&self, instance: &str, key: &str) -> Option<i64> {
        self.get(instance, key).and_then(ConfigValue::as_int)
    }

    fn get_double(&self, instance: &str, key: &str) -> Option<f64> {
        self.get(instance, key).and_then(ConfigValue::as_double)
    }

    fn get_string(&self, instance: &str, key: &str) -> Option<String> {
        self.get(instance, key).map(ConfigValue::as_string)
    }

    fn is_set(&self, instance: &str, key: &str) -> bool {
        self.get(instance, key).is_some()
    }
}

/// A [`ConfigSource`] scoped to one instance.
#[derive(Clone, Copy)]
pub struct InstanceConfig<'a> {
    instance: &'a str,
    source: &'a dyn ConfigSource,
}

impl<'a> InstanceConfig<'a> {
    /// Scope `source` to `instance`.
    pub fn new(instance: &'a str, source: &'a dyn ConfigSource) -> Self {
        Self { instance, source }
    }

    /// Instance name of this scope.
    pub fn instance(&self) -> &str {
        self.instance
    }

    /// Returns `true` if `key` is set.
    pub fn is_set(&self, key: &str) -> bool {
        self.source.is_set(self.instance, key)
    }

    /// Optional integer.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.source.get_int(self.instance, key)
    }

    /// Optional float.
    pub fn double(&self, key: &str) -> Option<f64> {
        self.source.get_double(self.instance, key)
    }

    /// Optional string.
    pub fn string(&self, key: &str) -> Option<String> {
        self.source.get_string(self.instance, key)
    }

    /// Integer with a default.
    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.int(key).unwrap_or(default)
    }

    /// Float with a default.
    pub fn double_or(&self, key: &str, default: f64) -> f64 {
        self.double(key).unwrap_or(default)
    }

    /// String with a default.
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    /// Boolean (non-zero integer) with a default.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.int(key).map_or(default, |v| v != 0)
    }

    /// Required integer.
    pub fn require_int(&self, key: &str) -> Result<i64, ComponentError> {
        self.require(key, self.int(key), "an integer")
    }

    /// Required float.
    pub fn require_double(&self, key: &str) -> Result<f64, ComponentError> {
        self.require(key, self.double(key), "a number")
    }

    /// Required string.
    pub fn require_string(&self, key: &str) -> Result<String, ComponentError> {
        self.require(key, self.string(key), "a string")
    }

    /// Required positive integer, as a count.
    pub fn require_count(&self, key: &str) -> Result<usize, ComponentError> {
        let v = self.require_int(key)?;
        usize::try_from(v)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ComponentError::invalid(key, format!("expected a positive count, got {v}")))
    }

    fn require<T>(&self, key: &str, value: Option<T>, what: &str) -> Result<T, ComponentError> {
        match value {
            Some(v) => Ok(v),
            None if self.is_set(key) => Err(ComponentError::invalid(key, format!("expected {what}"))),
            None => Err(ComponentError::missing(key)),
        }
    }
}

impl std::fmt::Debug for InstanceConfig<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}
