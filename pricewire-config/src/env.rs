// Environment variable overrides

use serde_json::Value;
use std::env;

/// Prefix for override variables.
pub const ENV_PREFIX: &str = "PRICEWIRE";

/// Collect `PRICEWIRE_`-prefixed overrides and apply them onto a config
/// value. `__` separates nesting levels:
/// `PRICEWIRE_EMAIL__PROVIDER=mock` sets `email.provider`.
pub fn apply_env_overrides(config: &mut Value) {
    let vars: Vec<(String, String)> = env::vars().collect();
    apply_overrides_from(config, vars.into_iter());
}

/// Apply overrides from an explicit variable iterator (testable core).
pub fn apply_overrides_from(config: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    let prefix = format!("{}_", ENV_PREFIX);

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        // Reserved for the logging crate, not the settings tree.
        if rest.starts_with("LOG") || rest == "DEBUG" {
            continue;
        }

        let path: Vec<String> = rest.split("__").map(|s| s.to_lowercase()).collect();
        set_path(config, &path, coerce(&value));
    }
}

/// Walk (and create) the object path, then set the leaf.
fn set_path(config: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        return;
    }

    if !config.is_object() {
        *config = Value::Object(serde_json::Map::new());
    }

    let mut cursor = config;
    for segment in &path[..path.len() - 1] {
        let entry = cursor
            .as_object_mut()
            .expect("cursor is an object")
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        cursor = entry;
    }

    cursor
        .as_object_mut()
        .expect("cursor is an object")
        .insert(path[path.len() - 1].clone(), value);
}

/// Interpret an override string as bool, integer, float or string.
fn coerce(s: &str) -> Value {
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(s.to_string())
}
