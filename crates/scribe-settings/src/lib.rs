//! # scribe-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ScribeSettings::default()`]
//! 2. **User file**: `~/.scribe/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SCRIBE_*` overrides (highest priority)
//!
//! The merged result is validated before use; an invalid window/stride pair
//! is rejected rather than silently clamped.
//!
//! # Usage
//!
//! ```no_run
//! use scribe_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("model: {}", settings.model);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{EngineSettings, ScribeSettings};

use std::sync::OnceLock;

/// Global settings singleton.
///
/// Initialized on first access via [`get_settings`].
static SETTINGS: OnceLock<ScribeSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.scribe/settings.json` with env var
/// overrides. If loading fails, logs the error and returns compiled defaults.
pub fn get_settings() -> &'static ScribeSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ScribeSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns `Err(settings)` if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ScribeSettings) -> std::result::Result<(), ScribeSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
