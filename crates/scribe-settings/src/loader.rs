//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ScribeSettings::default()`]
//! 2. If `~/.scribe/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ScribeSettings;

/// Resolve the path to the settings file (`~/.scribe/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scribe").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ScribeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, starts from defaults. Invalid JSON or an
/// invalid merged result is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ScribeSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<ScribeSettings> {
    let defaults = serde_json::to_value(ScribeSettings::default())?;

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

/// Apply `SCRIBE_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut ScribeSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are ignored with a warning and fall back to file/default.
pub fn apply_overrides(settings: &mut ScribeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let read_f64 = |name: &str, min: f64, max: f64| {
        let val = lookup(name)?;
        let result = parse_f64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid number env var, ignoring");
        }
        result
    };
    let read_usize = |name: &str, min: usize, max: usize| {
        let val = lookup(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    };

    if let Some(v) = read_string("SCRIBE_MODEL") {
        settings.model = v;
    }
    if let Some(v) = read_f64("SCRIBE_WINDOW_LENGTH_S", 1.0, 3600.0) {
        settings.window_length_s = v;
    }
    if let Some(v) = read_f64("SCRIBE_STRIDE_S", 0.1, 3600.0) {
        settings.stride_s = v;
    }
    if let Some(v) = read_string("SCRIBE_CACHE_DIR") {
        settings.cache_dir = Some(v);
    }
    if let Some(v) = read_string("SCRIBE_LOG_LEVEL") {
        settings.log_level = v;
    }

    // ── Engine settings ─────────────────────────────────────────────
    if let Some(v) = read_usize("SCRIBE_INTRA_THREADS", 1, 256) {
        settings.engine.intra_threads = v;
    }
    if let Some(v) = read_usize("SCRIBE_MAX_NEW_TOKENS", 1, 448) {
        settings.engine.max_new_tokens = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
