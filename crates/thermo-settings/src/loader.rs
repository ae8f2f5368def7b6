//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `THERMO_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::BridgeSettings;

/// Default settings file (`~/.thermo-bridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".thermo-bridge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid value is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `THERMO_*` environment overrides from the process environment.
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` as the variable source.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_overrides_from(settings: &mut BridgeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Device ──────────────────────────────────────────────────────
    if let Some(v) = env.string("THERMO_DEVICE_HOST") {
        settings.device.host = v;
    }
    if let Some(v) = env.u16("THERMO_DEVICE_PORT", 1, 65535) {
        settings.device.port = v;
    }
    if let Some(v) = env.f64("THERMO_SETPOINT") {
        settings.device.setpoint = v;
    }
    if let Some(v) = env.u64("THERMO_POLL_INTERVAL_MS", 10, 3_600_000) {
        settings.device.poll_interval_ms = v;
    }
    if let Some(v) = env.bool("THERMO_RECONNECT") {
        settings.device.reconnect.enabled = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("THERMO_HTTP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("THERMO_HTTP_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("THERMO_STATIC_DIR") {
        settings.server.static_dir = v;
    }
    if let Some(v) = env.u64("THERMO_HEARTBEAT_INTERVAL_MS", 10, 3_600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("THERMO_STATUS_INTERVAL_MS", 10, 3_600_000) {
        settings.server.status_interval_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64`.
pub fn parse_finite_f64(val: &str) -> Option<f64> {
    val.parse::<f64>().ok().filter(|n| n.is_finite())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn f64(&self, name: &str) -> Option<f64> {
        self.parsed(name, "f64", parse_finite_f64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"device": {"port": 46879, "host": "127.0.0.1"}});
        let source = serde_json::json!({"device": {"port": 5000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["device"]["port"], 5000);
        assert_eq!(merged["device"]["host"], "127.0.0.1");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"device": {"setpoint": 225.5, "reconnect": {"enabled": true}}, "server": {"port": 9000}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.device.setpoint, 225.5);
        assert!(settings.device.reconnect.enabled);
        assert_eq!(settings.device.reconnect.max_attempts, 10);
        assert_eq!(settings.device.port, 46879);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.heartbeat_interval_ms, 1000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"statusIntervalMs": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::InvalidValue(_))));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = BridgeSettings::default();
        apply_overrides_from(
            &mut settings,
            env_of(&[
                ("THERMO_DEVICE_HOST", "10.0.0.7"),
                ("THERMO_DEVICE_PORT", "5025"),
                ("THERMO_SETPOINT", "180.5"),
                ("THERMO_HTTP_PORT", "9001"),
                ("THERMO_RECONNECT", "yes"),
                ("THERMO_STATIC_DIR", "/srv/www"),
            ]),
        );
        assert_eq!(settings.device.addr(), "10.0.0.7:5025");
        assert_eq!(settings.device.setpoint, 180.5);
        assert!(settings.device.reconnect.enabled);
        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.server.static_dir, "/srv/www");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = BridgeSettings::default();
        apply_overrides_from(
            &mut settings,
            env_of(&[
                ("THERMO_DEVICE_PORT", "0"),
                ("THERMO_SETPOINT", "NaN"),
                ("THERMO_POLL_INTERVAL_MS", "soon"),
                ("THERMO_DEVICE_HOST", ""),
            ]),
        );
        assert_eq!(settings, BridgeSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8081", 1, 65535), Some(8081));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 10, 100), None);
        assert_eq!(parse_finite_f64("300.0"), Some(300.0));
        assert_eq!(parse_finite_f64("inf"), None);
    }
}
