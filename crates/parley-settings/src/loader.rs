//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PARLEY_*` environment overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use parley_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ParleySettings;

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a combination rejected by
/// [`ParleySettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
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

/// Apply environment variable overrides to loaded settings.
///
/// Numeric values must parse and fall inside the stated range; anything else
/// is logged and ignored, leaving the file/default value in place.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    if let Some(v) = read_env_string("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("PARLEY_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("PARLEY_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_env_u64("PARLEY_HEARTBEAT_INTERVAL_MS", 1000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("PARLEY_HEARTBEAT_TIMEOUT_MS", 1000, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("PARLEY_SEND_TIMEOUT_MS", 100, 600_000) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("PARLEY_OUTBOUND_QUEUE", 1, 65_536) {
        settings.server.outbound_queue = v;
    }
    if let Some(v) = read_env_string("PARLEY_DEFAULT_NAME") {
        settings.server.default_display_name = v;
    }
    if let Some(v) = read_env_string("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("PARLEY_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "PARLEY_LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
