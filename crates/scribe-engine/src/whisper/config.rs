//! `config.json` and `preprocessor_config.json` from the ONNX export.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::errors::{Result, ResultExt};

/// Fields of the model `config.json` the engine needs.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    /// Encoder output positions per window (1500 for every Whisper size).
    pub max_source_positions: usize,
    /// Longest decoder sequence, prompt included (448).
    pub max_target_positions: usize,
}

/// Fields of `preprocessor_config.json`.
#[derive(Clone, Debug, Deserialize)]
pub struct PreprocessorConfig {
    /// Window length in seconds.
    pub chunk_length: u32,
    /// Number of mel bands.
    pub feature_size: usize,
    /// Samples between frames.
    pub hop_length: usize,
    /// FFT size (equal to the analysis window length).
    pub n_fft: usize,
    /// Samples per padded window.
    pub n_samples: usize,
    /// Frames per padded window.
    pub nb_max_frames: usize,
    /// Expected input sample rate.
    pub sampling_rate: u32,
}

impl PreprocessorConfig {
    /// Seconds per timestamp token: window length over encoder positions.
    #[allow(clippy::cast_precision_loss)]
    pub fn time_precision(&self, model: &ModelConfig) -> f64 {
        f64::from(self.chunk_length) / model.max_source_positions.max(1) as f64
    }
}

/// Read and parse one JSON config file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let name = path.display().to_string();
    let raw = std::fs::read_to_string(path).model(&name)?;
    serde_json::from_str(&raw).model(&name)
}
