//! Supported models and their ONNX export repositories.

use serde::Serialize;

use crate::errors::{EngineError, Result};

/// A model the Whisper engine knows how to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Public identifier callers use, e.g. `openai/whisper-tiny.en`.
    pub id: &'static str,
    /// Hugging Face repository holding the ONNX export.
    pub repo: &'static str,
    /// English-only checkpoints take no language/task prefix tokens.
    pub english_only: bool,
    /// Approximate download size of the ONNX files in megabytes.
    pub approx_size_mb: u32,
}

/// Every supported model.
pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "openai/whisper-tiny.en",
        repo: "Xenova/whisper-tiny.en",
        english_only: true,
        approx_size_mb: 152,
    },
    ModelSpec {
        id: "openai/whisper-tiny",
        repo: "Xenova/whisper-tiny",
        english_only: false,
        approx_size_mb: 152,
    },
    ModelSpec {
        id: "openai/whisper-base",
        repo: "Xenova/whisper-base",
        english_only: false,
        approx_size_mb: 291,
    },
    ModelSpec {
        id: "openai/whisper-base.en",
        repo: "Xenova/whisper-base.en",
        english_only: true,
        approx_size_mb: 291,
    },
    ModelSpec {
        id: "openai/whisper-small",
        repo: "Xenova/whisper-small",
        english_only: false,
        approx_size_mb: 967,
    },
    ModelSpec {
        id: "openai/whisper-small.en",
        repo: "Xenova/whisper-small.en",
        english_only: true,
        approx_size_mb: 967,
    },
];

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "openai/whisper-tiny.en";

/// Resolve a model identifier (or its export repository name).
pub fn lookup(model: &str) -> Result<&'static ModelSpec> {
    MODELS
        .iter()
        .find(|m| m.id == model || m.repo == model)
        .ok_or_else(|| EngineError::UnknownModel(model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_model_is_listed() {
        assert!(lookup(DEFAULT_MODEL).is_ok());
    }

    #[test]
    fn lookup_by_repo_name() {
        let spec = lookup("Xenova/whisper-base.en").unwrap();
        assert_eq!(spec.id, "openai/whisper-base.en");
        assert!(spec.english_only);
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert_matches!(lookup("openai/whisper-huge"), Err(EngineError::UnknownModel(_)));
    }

    #[test]
    fn english_only_matches_suffix() {
        for m in MODELS {
            assert_eq!(m.english_only, m.id.ends_with(".en"), "{}", m.id);
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = MODELS.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MODELS.len());
    }
}
