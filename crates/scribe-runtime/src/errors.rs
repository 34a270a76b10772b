//! Pipeline error types.

use scribe_core::{FailureReason, WorkerMessage};
use scribe_engine::EngineError;

/// Errors that end a transcription call.
///
/// Every variant maps onto exactly one [`FailureReason`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The engine could not be loaded, or failed while decoding a window.
    #[error("engine unavailable: {0}")]
    Engine(#[from] EngineError),

    /// A blocking engine task panicked or was aborted.
    #[error("engine task failed: {0}")]
    Join(String),

    /// The input sample sequence is unusable.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    /// Another transcription is already running on this engine.
    #[error("transcription already in progress")]
    Busy,

    /// Window outputs could not be merged into a transcript.
    #[error("stitch failure: {0}")]
    Stitch(String),

    /// The caller cancelled the request or stopped listening.
    #[error("transcription cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Failure classification reported to the host.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Engine(_) | Self::Join(_) => FailureReason::EngineUnavailable,
            Self::InvalidAudio(_) => FailureReason::InvalidAudio,
            Self::Busy => FailureReason::Busy,
            Self::Stitch(_) => FailureReason::StitchFailure,
            Self::Cancelled => FailureReason::Cancelled,
        }
    }

    /// Terminal `Failed` message for this error.
    pub fn to_message(&self) -> WorkerMessage {
        WorkerMessage::failed(self.reason(), self.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
