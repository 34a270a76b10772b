//! Engine contracts.
//!
//! The pipeline treats the ASR engine as a black box with three
//! capabilities:
//!
//! - [`EngineLoader`] acquires model weights (reporting byte progress) and
//!   builds an engine once per process
//! - [`SpeechEngine`] decodes one bounded window of samples into token ids
//! - [`Vocabulary`] turns token ids back into text and classifies special and
//!   timestamp tokens for stitching
//!
//! `generate` is blocking and CPU-bound; callers run it on
//! `tokio::task::spawn_blocking`.

use std::sync::Arc;

use async_trait::async_trait;
use scribe_core::{ProgressEvent, TokenId};

use crate::errors::Result;

/// Token decoding and classification.
pub trait Vocabulary: Send + Sync {
    /// Decode text tokens. Special and timestamp tokens are never passed in.
    fn decode(&self, tokens: &[TokenId]) -> Result<String>;

    /// First timestamp token (`<|0.00|>`). Every id at or above it is a
    /// timestamp.
    fn timestamp_begin(&self) -> TokenId;

    /// Whether `token` is a non-timestamp special token (start/end of
    /// transcript, language, task markers).
    fn is_special(&self, token: TokenId) -> bool;

    /// Whether `token` is a timestamp token.
    fn is_timestamp(&self, token: TokenId) -> bool {
        token >= self.timestamp_begin()
    }
}

/// A loaded speech recognition model.
pub trait SpeechEngine: Send + Sync {
    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;

    /// Seconds per timestamp-token step.
    ///
    /// Derived from the loaded model: feature-extractor chunk length divided
    /// by the encoder's maximum source positions.
    fn time_precision(&self) -> f64;

    /// Vocabulary used to decode this engine's tokens.
    fn vocabulary(&self) -> Arc<dyn Vocabulary>;

    /// Decode one window of 16 kHz mono samples (blocking).
    ///
    /// Returns every generated token id, including special and timestamp
    /// tokens, in decode order.
    fn generate(&self, window: &[f32]) -> Result<Vec<TokenId>>;
}

/// Shared handle to a loaded engine.
pub type EngineHandle = Arc<dyn SpeechEngine>;

/// Receives model acquisition progress. May be called from blocking threads.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Builds engines for model identifiers.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// Acquire model files and construct the engine.
    async fn load(&self, model: &str, progress: ProgressCallback) -> Result<EngineHandle>;
}
