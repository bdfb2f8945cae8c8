//! Shared CLI helpers used across multiple commands.

use std::path::Path;

use anyhow::Context;
use sigflow_components::register_builtin;
use sigflow_config::Pipeline;
use sigflow_core::ComponentRegistry;
use tracing::info;

/// Registry with every built-in component type.
pub fn builtin_registry() -> anyhow::Result<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    register_builtin(&mut registry).context("registering built-in components")?;
    Ok(registry)
}

/// Parse an `instance.key=value` override for clap's `value_parser`.
pub fn parse_override(s: &str) -> Result<(String, String, toml::Value), String> {
    let (target, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid override: '{s}' (expected instance.key=value)"))?;
    let (instance, key) = target
        .split_once('.')
        .filter(|(i, k)| !i.is_empty() && !k.is_empty())
        .ok_or_else(|| format!("Invalid override: '{s}' (expected instance.key=value)"))?;
    Ok((instance.to_string(), key.to_string(), parse_value(value)))
}

/// Integers, floats and booleans keep their type; anything else is a string.
fn parse_value(raw: &str) -> toml::Value {
    if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else {
        toml::Value::String(raw.to_string())
    }
}

/// Load a pipeline file, apply overrides, and validate it against `registry`.
pub fn load_pipeline(
    path: &Path,
    overrides: &[(String, String, toml::Value)],
    registry: &ComponentRegistry,
) -> anyhow::Result<Pipeline> {
    let mut pipeline = Pipeline::load(path)?;
    for (instance, key, value) in overrides {
        let entry = pipeline
            .get_mut(instance)
            .ok_or_else(|| anyhow::anyhow!("Override for unknown instance '{instance}'"))?;
        entry.set_param(key, value.clone());
    }
    pipeline.prepare(registry)?;
    info!(path = %path.display(), instances = pipeline.len(), overrides = overrides.len(), "pipeline loaded");
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_keep_value_types() {
        let (i, k, v) = parse_override("gen.frames=100").unwrap();
        assert_eq!((i.as_str(), k.as_str()), ("gen", "frames"));
        assert_eq!(v, toml::Value::Integer(100));

        let (_, k, v) = parse_override("gen.writer.level=pcm").unwrap();
        assert_eq!(k, "writer.level");
        assert_eq!(v, toml::Value::String("pcm".into()));

        assert_eq!(parse_override("g.gain=0.5").unwrap().2, toml::Value::Float(0.5));
        assert_eq!(parse_override("g.on=true").unwrap().2, toml::Value::Boolean(true));
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(parse_override("frames=100").is_err());
        assert!(parse_override("gen.frames").is_err());
        assert!(parse_override(".frames=1").is_err());
    }
}
