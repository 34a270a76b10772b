//! # scribe-runtime
//!
//! Long-form transcription pipeline on top of a bounded-window engine.
//!
//! - **Planner**: splits samples into overlapping fixed-length windows
//! - **Stitch**: merges per-window token output across overlaps into
//!   timestamped segments
//! - **Tracker**: re-stitches the whole history after every window and emits
//!   transcript snapshots
//! - **Adapter**: single-flight engine loading, the one-call-at-a-time guard,
//!   cancellation between windows
//! - **Worker**: host message loop that tags every message with its request

#![deny(unsafe_code)]

pub mod adapter;
pub mod errors;
pub mod planner;
pub mod stitch;
pub mod tracker;
pub mod worker;

pub use adapter::{EngineAdapter, MessageStream, TranscriptionPermit};
pub use errors::{PipelineError, Result};
pub use planner::{AudioWindow, plan_windows};
pub use stitch::{MergedChunk, stitch};
pub use tracker::{GenerationTracker, MessageSink};
pub use worker::{Worker, WorkerHandle};
