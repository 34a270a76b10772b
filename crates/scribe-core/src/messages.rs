//! Message protocol between the host and the transcription worker.
//!
//! The worker never returns values directly: every outcome of a transcription
//! call is a [`WorkerMessage`]. For one call the order is
//!
//! ```text
//! Queued → LoadingModel → Downloading* → ModelReady → Result* → Done
//! ```
//!
//! and `Failed` may replace any suffix of that sequence. `Done` and `Failed`
//! are terminal: nothing follows them for the same request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::RequestId;
use crate::transcript::Transcript;

// ─────────────────────────────────────────────────────────────────────────────
// Failure reasons
// ─────────────────────────────────────────────────────────────────────────────

/// Why a transcription call terminated without `Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// The model failed to load (network, storage, unknown model).
    EngineUnavailable,
    /// The sample sequence was empty or contained non-finite values.
    InvalidAudio,
    /// Another transcription is already running on this engine.
    Busy,
    /// The engine produced chunk data that could not be stitched.
    StitchFailure,
    /// The caller cancelled the call.
    Cancelled,
}

impl FailureReason {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EngineUnavailable => "EngineUnavailable",
            Self::InvalidAudio => "InvalidAudio",
            Self::Busy => "Busy",
            Self::StitchFailure => "StitchFailure",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model loading progress
// ─────────────────────────────────────────────────────────────────────────────

/// Phase of a model file acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// The file is about to be fetched.
    Queued,
    /// Bytes are arriving.
    Progress,
    /// The file is available locally.
    Done,
}

/// Progress notification emitted by an engine loader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Acquisition phase.
    pub status: ProgressStatus,
    /// File being fetched, relative to the model repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Bytes received so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded: Option<u64>,
    /// Total size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl ProgressEvent {
    /// A file is queued for download.
    pub fn queued(file: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Queued,
            file: Some(file.into()),
            loaded: None,
            total: None,
        }
    }

    /// Byte progress for a file.
    pub fn progress(file: impl Into<String>, loaded: u64, total: u64) -> Self {
        Self {
            status: ProgressStatus::Progress,
            file: Some(file.into()),
            loaded: Some(loaded),
            total: Some(total),
        }
    }

    /// A file finished downloading (or was already cached).
    pub fn done(file: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Done,
            file: Some(file.into()),
            loaded: None,
            total: None,
        }
    }

    /// Convert to a `Downloading` message.
    ///
    /// Only complete byte-progress events qualify: status `progress` with
    /// file, loaded and total all present. Everything else is `None`.
    pub fn to_downloading(&self) -> Option<WorkerMessage> {
        if self.status != ProgressStatus::Progress {
            return None;
        }
        let (Some(file), Some(loaded), Some(total)) = (&self.file, self.loaded, self.total)
        else {
            return None;
        };
        #[allow(clippy::cast_precision_loss)]
        let progress = if total == 0 {
            100.0
        } else {
            (loaded as f64 / total as f64 * 100.0).min(100.0)
        };
        Some(WorkerMessage::Downloading {
            file: file.clone(),
            loaded,
            total,
            progress,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker → host
// ─────────────────────────────────────────────────────────────────────────────

/// Message emitted by the worker for one transcription call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The request was accepted.
    Queued,
    /// Engine acquisition started.
    LoadingModel {
        /// Requested model identifier.
        model: String,
    },
    /// Byte progress of a model file download.
    Downloading {
        /// File being fetched.
        file: String,
        /// Bytes received so far.
        loaded: u64,
        /// Total size in bytes.
        total: u64,
        /// Percentage in `0..=100`.
        progress: f64,
    },
    /// The engine is loaded and inference is about to start.
    ModelReady {
        /// Loaded model identifier.
        model: String,
    },
    /// Incremental transcript after one more window.
    Result {
        /// Full current transcript, recomputed from every window so far.
        transcript: Transcript,
        /// Always `false`; completion is signalled by [`WorkerMessage::Done`].
        done: bool,
        /// End of the last segment in whole seconds.
        cursor: u32,
    },
    /// Inference finished. Terminal.
    Done {
        /// Final transcript.
        transcript: Transcript,
    },
    /// The call failed. Terminal.
    Failed {
        /// Failure classification.
        reason: FailureReason,
        /// Human-readable detail.
        message: String,
    },
}

impl WorkerMessage {
    /// Build a `Failed` message.
    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        Self::Failed {
            reason,
            message: message.into(),
        }
    }

    /// Whether this message ends the sequence for its request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }

    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::LoadingModel { .. } => "loading_model",
            Self::Downloading { .. } => "downloading",
            Self::ModelReady { .. } => "model_ready",
            Self::Result { .. } => "result",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Worker output tagged with the request it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEvent {
    /// Originating request.
    pub request_id: RequestId,
    /// The message itself.
    #[serde(flatten)]
    pub message: WorkerMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Host → worker
// ─────────────────────────────────────────────────────────────────────────────

/// Message sent by the host to the worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostMessage {
    /// Transcribe a decoded 16 kHz mono sample sequence.
    StartTranscription {
        /// Caller-chosen request id.
        request_id: RequestId,
        /// Samples, 16 kHz mono.
        audio: Vec<f32>,
        /// Model identifier, e.g. `openai/whisper-tiny.en`.
        model_name: String,
    },
    /// Abandon a running request at the next window boundary.
    Cancel {
        /// Request to cancel.
        request_id: RequestId,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
