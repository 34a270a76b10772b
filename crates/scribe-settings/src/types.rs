//! Settings types.

use std::path::PathBuf;

use scribe_core::WindowSpec;
use scribe_core::window::{DEFAULT_STRIDE_S, DEFAULT_WINDOW_LENGTH_S};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Top-level scribe settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScribeSettings {
    /// Model identifier loaded by the engine, e.g. `openai/whisper-tiny.en`.
    pub model: String,
    /// Window length in seconds.
    pub window_length_s: f64,
    /// Overlap between consecutive windows in seconds.
    pub stride_s: f64,
    /// Model cache directory. `None` resolves to `~/.scribe/models`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Inference engine tuning.
    pub engine: EngineSettings,
}

impl Default for ScribeSettings {
    fn default() -> Self {
        Self {
            model: "openai/whisper-tiny.en".to_string(),
            window_length_s: DEFAULT_WINDOW_LENGTH_S,
            stride_s: DEFAULT_STRIDE_S,
            cache_dir: None,
            log_level: "warn".to_string(),
            engine: EngineSettings::default(),
        }
    }
}

impl ScribeSettings {
    /// Validated window policy.
    pub fn window_spec(&self) -> Result<WindowSpec> {
        WindowSpec::new(self.window_length_s, self.stride_s)
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        let _ = self.window_spec()?;
        if self.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue("model must not be empty".into()));
        }
        if self.engine.max_new_tokens == 0 {
            return Err(SettingsError::InvalidValue(
                "engine.maxNewTokens must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolved model cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return PathBuf::from(dir);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".scribe").join("models")
    }
}

/// Inference engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Intra-op thread count for ONNX sessions.
    pub intra_threads: usize,
    /// Upper bound on generated tokens per window.
    pub max_new_tokens: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            max_new_tokens: 224,
        }
    }
}
