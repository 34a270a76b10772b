//! # scribe-engine
//!
//! Speech engine contracts and implementations.
//!
//! - **Contracts**: [`EngineLoader`], [`SpeechEngine`], [`Vocabulary`]
//! - **Catalogue**: supported model identifiers and their ONNX export repos
//! - **Whisper** (feature `ort`): encoder/decoder ONNX sessions, log-mel
//!   features, greedy timestamped decoding, hub downloads with byte progress
//! - **Audio** (feature `audio`): container decoding, mono mixdown and
//!   resampling to 16 kHz
//! - **Mock** (feature `testing`): scripted engine and loaders for pipeline
//!   tests
//!
//! ```text
//! samples → pad/trim 30 s → log-mel [1, n_mels, 3000]
//! → encoder_model.onnx → last_hidden_state
//! → decoder_model.onnx (greedy loop, timestamp rules) → token ids
//! ```

#![deny(unsafe_code)]

pub mod catalogue;
pub mod engine;
pub mod errors;
pub mod whisper;

#[cfg(feature = "audio")]
pub mod audio;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use catalogue::{DEFAULT_MODEL, MODELS, ModelSpec};
pub use engine::{EngineHandle, EngineLoader, ProgressCallback, SpeechEngine, Vocabulary};
pub use errors::{EngineError, Result, ResultExt};

#[cfg(feature = "ort")]
pub use whisper::WhisperLoader;
