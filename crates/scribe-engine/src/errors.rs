//! Engine error types.

use std::fmt::Display;

/// Errors raised while loading or running a speech engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The model identifier is not in the catalogue.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Model files not found, failed to download, or failed to load.
    #[error("model not available: {0}")]
    ModelNotAvailable(String),

    /// A model was requested that differs from the one already loaded.
    #[error("model mismatch: {requested} requested but {loaded} is loaded")]
    ModelMismatch {
        /// Model named by the request.
        requested: String,
        /// Model held by the engine.
        loaded: String,
    },

    /// ONNX Runtime session creation or inference failure.
    #[error("inference error: {0}")]
    Inference(String),

    /// Token ids could not be decoded to text.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Audio decoding failure (unsupported format, corrupt data).
    #[error("audio decode error: {0}")]
    AudioDecode(String),

    /// Resampling failure.
    #[error("resample error: {0}")]
    Resample(String),

    /// I/O error (file read/write).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Attach a context string while converting foreign errors.
pub trait ResultExt<T> {
    /// Map the error to [`EngineError::Inference`] prefixed with `context`.
    fn inference(self, context: &str) -> Result<T>;

    /// Map the error to [`EngineError::ModelNotAvailable`] prefixed with `context`.
    fn model(self, context: &str) -> Result<T>;
}

impl<T, E: Display> ResultExt<T> for std::result::Result<T, E> {
    fn inference(self, context: &str) -> Result<T> {
        self.map_err(|e| EngineError::Inference(format!("{context}: {e}")))
    }

    fn model(self, context: &str) -> Result<T> {
        self.map_err(|e| EngineError::ModelNotAvailable(format!("{context}: {e}")))
    }
}
