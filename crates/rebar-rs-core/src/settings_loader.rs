//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `REBAR_DEBUG` | `debug` |
//! | `REBAR_LOG_LEVEL` | `log_level` |
//! | `REBAR_DEFAULT_GROUP_PREFIX` | `default_group_prefix` |
//! | `REBAR_AUTO_ID` | `auto_id` |
//! | `REBAR_LABEL_SUFFIX` | `label_suffix` |
//! | `REBAR_FORMSET_EXTRA` | `formset_extra` |
//! | `REBAR_FORMSET_MAX_NUM` | `formset_max_num` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use rebar_rs_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file("config/rebar.toml").unwrap();
//! let settings = settings_loader::from_toml_file_with_env("config/rebar.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::RebarError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys missing from the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, RebarError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| RebarError::Configuration(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, RebarError> {
    let content = read_config_file(path.as_ref(), "TOML")?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, RebarError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, RebarError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| RebarError::Configuration(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, RebarError> {
    let content = read_config_file(path.as_ref(), "JSON")?;
    from_json_str(&content)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
///
/// Numeric variables that fail to parse are ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("REBAR_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("REBAR_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("REBAR_DEFAULT_GROUP_PREFIX") {
        settings.default_group_prefix = val;
    }

    if let Ok(val) = std::env::var("REBAR_AUTO_ID") {
        settings.auto_id = val;
    }

    if let Ok(val) = std::env::var("REBAR_LABEL_SUFFIX") {
        settings.label_suffix = val;
    }

    if let Ok(val) = std::env::var("REBAR_FORMSET_EXTRA") {
        if let Ok(extra) = val.parse::<usize>() {
            settings.formset_extra = extra;
        }
    }

    if let Ok(val) = std::env::var("REBAR_FORMSET_MAX_NUM") {
        if let Ok(max_num) = val.parse::<usize>() {
            settings.formset_max_num = max_num;
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config_file(path: &Path, format: &str) -> Result<String, RebarError> {
    std::fs::read_to_string(path).map_err(|e| {
        RebarError::Configuration(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

/// Deep-merges `value` over the serialized defaults and deserializes the result.
fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, RebarError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        RebarError::Configuration(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        RebarError::Configuration(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = false
            default_group_prefix = "contact"
            auto_id = "field_%s"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.default_group_prefix, "contact");
        assert_eq!(settings.auto_id, "field_%s");
        // Defaults preserved
        assert_eq!(settings.label_suffix, ":");
        assert_eq!(settings.formset_max_num, 1000);
    }

    #[test]
    fn test_from_toml_str_extra_table() {
        let toml = r#"
            [extra]
            theme = "dark"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(
            settings.extra.get("theme"),
            Some(&serde_json::Value::String("dark".into()))
        );
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert_eq!(settings.default_group_prefix, "group");
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("this is = = not toml");
        assert!(matches!(result, Err(RebarError::Configuration(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("formset_extra = \"many\"");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let settings =
            from_json_str(r#"{"formset_extra": 3, "log_level": "debug"}"#).unwrap();
        assert_eq!(settings.formset_extra, 3);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.auto_id, "id_%s");
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{not json").is_err());
    }

    // ── Files ───────────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rebar_settings_{}.toml", std::process::id()));
        std::fs::write(&path, "label_suffix = \" -\"\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.label_suffix, " -");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_json_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rebar_settings_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"formset_max_num": 5}"#).unwrap();

        let settings = from_json_file(&path).unwrap();
        assert_eq!(settings.formset_max_num, 5);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/rebar.toml");
        assert!(matches!(result, Err(RebarError::Configuration(_))));
    }

    // ── Environment ─────────────────────────────────────────────────

    // Env vars are process-global, so all env assertions live in one test.
    #[test]
    fn test_apply_env_overrides() {
        std::env::set_var("REBAR_DEFAULT_GROUP_PREFIX", "envgroup");
        std::env::set_var("REBAR_DEBUG", "0");
        std::env::set_var("REBAR_FORMSET_MAX_NUM", "not-a-number");

        let settings = from_env();
        assert_eq!(settings.default_group_prefix, "envgroup");
        assert!(!settings.debug);
        assert_eq!(settings.formset_max_num, 1000);

        std::env::remove_var("REBAR_DEFAULT_GROUP_PREFIX");
        std::env::remove_var("REBAR_DEBUG");
        std::env::remove_var("REBAR_FORMSET_MAX_NUM");
    }
}
