//! # scribe-core
//!
//! Shared vocabulary for the scribe transcription pipeline.
//!
//! - **Messages**: [`WorkerMessage`] / [`HostMessage`] exchanged across the
//!   worker boundary, wrapped in [`WorkerEvent`] envelopes
//! - **Transcript**: [`ProcessedChunk`] and [`Transcript`] snapshots with a
//!   running cursor
//! - **Chunks**: [`RawChunk`] engine output with its [`ChunkStride`] geometry
//! - **Windows**: validated [`WindowSpec`] (window length and stride)
//! - **IDs**: [`RequestId`] as a UUID v7 newtype
//! - **Errors**: [`CoreError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for `tracing` setup

#![deny(unsafe_code)]

pub mod chunks;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod transcript;
pub mod window;

pub use chunks::{ChunkStride, RawChunk, TokenId};
pub use constants::SAMPLE_RATE;
pub use errors::{CoreError, Result};
pub use ids::RequestId;
pub use messages::{
    FailureReason, HostMessage, ProgressEvent, ProgressStatus, WorkerEvent, WorkerMessage,
};
pub use transcript::{ProcessedChunk, Transcript};
pub use window::WindowSpec;
