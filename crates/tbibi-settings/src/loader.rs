//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TbibiSettings::default()`]
//! 2. If `~/.tbibi/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TBIBI_*` environment variable overrides
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TbibiSettings;

/// Resolve the tbibi data directory (`~/.tbibi`).
pub fn tbibi_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tbibi")
}

/// Resolve the path to the settings file (`~/.tbibi/settings.json`).
pub fn settings_path() -> PathBuf {
    tbibi_home().join("settings.json")
}

/// Resolve the configured database path. Relative paths live under `~/.tbibi`.
pub fn resolve_db_path(settings: &TbibiSettings) -> PathBuf {
    let path = Path::new(&settings.database.path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        tbibi_home().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TbibiSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TbibiSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<TbibiSettings> {
    let defaults = serde_json::to_value(TbibiSettings::default())?;

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

/// Reject settings combinations that would leave the server unusable.
pub fn validate(settings: &TbibiSettings) -> Result<()> {
    let rt = &settings.realtime;
    if rt.outbound_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.outboundQueueCapacity must be at least 1".into(),
        ));
    }
    if rt.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.heartbeatIntervalSecs must be at least 1".into(),
        ));
    }
    if rt.heartbeat_timeout_secs <= rt.heartbeat_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "realtime.heartbeatTimeoutSecs ({}) must exceed heartbeatIntervalSecs ({})",
            rt.heartbeat_timeout_secs, rt.heartbeat_interval_secs
        )));
    }
    if settings.database.pool_size == 0 {
        return Err(SettingsError::InvalidValue(
            "database.poolSize must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Apply `TBIBI_*` environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut TbibiSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
pub fn apply_overrides_with<F>(settings: &mut TbibiSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TBIBI_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TBIBI_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("TBIBI_ALLOWED_ORIGINS") {
        settings.server.allowed_origins = parse_list(&v);
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = env.usize("TBIBI_QUEUE_CAPACITY", 1, 65_536) {
        settings.realtime.outbound_queue_capacity = v;
    }
    if let Some(v) = env.u64("TBIBI_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.realtime.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("TBIBI_HEARTBEAT_TIMEOUT_SECS", 2, 7200) {
        settings.realtime.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.bool("TBIBI_PERSIST_MESSAGES") {
        settings.realtime.persist_messages = v;
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = env.string("TBIBI_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = env.u64("TBIBI_DB_POOL_SIZE", 1, 256) {
        settings.database.pool_size = u32::try_from(v).unwrap_or(u32::MAX);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TBIBI_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("TBIBI_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming whitespace and skipping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
