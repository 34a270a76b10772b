//! Model file acquisition from the Hugging Face hub.
//!
//! Files already in the local hub cache are used as-is and report no
//! progress. Missing files are fetched with byte-level progress forwarded to
//! the loader's [`ProgressCallback`].

use std::path::{Path, PathBuf};

use hf_hub::api::Progress;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo};
use scribe_core::ProgressEvent;
use tracing::{debug, info};

use crate::engine::ProgressCallback;
use crate::errors::{EngineError, Result, ResultExt};

/// Model configuration.
pub const CONFIG: &str = "config.json";
/// Feature extractor configuration.
pub const PREPROCESSOR_CONFIG: &str = "preprocessor_config.json";
/// Fast tokenizer.
pub const TOKENIZER: &str = "tokenizer.json";
/// Audio encoder.
pub const ENCODER: &str = "onnx/encoder_model.onnx";
/// Text decoder (no past key/values).
pub const DECODER: &str = "onnx/decoder_model.onnx";

/// Every file a Whisper export needs, smallest first.
pub const MODEL_FILES: &[&str] = &[CONFIG, PREPROCESSOR_CONFIG, TOKENIZER, ENCODER, DECODER];

/// Local paths of a complete model.
#[derive(Clone, Debug)]
pub struct ModelFiles {
    /// `config.json`.
    pub config: PathBuf,
    /// `preprocessor_config.json`.
    pub preprocessor: PathBuf,
    /// `tokenizer.json`.
    pub tokenizer: PathBuf,
    /// Encoder ONNX graph.
    pub encoder: PathBuf,
    /// Decoder ONNX graph.
    pub decoder: PathBuf,
}

/// Return cached paths, downloading whatever is missing (blocking).
pub fn ensure_model(cache_dir: &Path, repo: &str, progress: &ProgressCallback) -> Result<ModelFiles> {
    std::fs::create_dir_all(cache_dir)?;
    let cache = Cache::new(cache_dir.to_path_buf()).repo(Repo::model(repo.to_string()));

    let mut api_repo = None;
    let mut paths = Vec::with_capacity(MODEL_FILES.len());
    for &file in MODEL_FILES {
        if let Some(path) = cache.get(file) {
            debug!(repo, file, "model file cached");
            paths.push(path);
            continue;
        }

        let remote = match api_repo.take() {
            Some(remote) => remote,
            None => {
                info!(repo, "downloading model files");
                ApiBuilder::new()
                    .with_cache_dir(cache_dir.to_path_buf())
                    .with_progress(false)
                    .build()
                    .model("hub client")?
                    .model(repo.to_string())
            }
        };

        progress(ProgressEvent::queued(file));
        let path = remote
            .download_with_progress(file, ForwardProgress::new(file, progress.clone()))
            .model(&format!("download {file}"))?;
        api_repo = Some(remote);
        debug!(repo, file, "downloaded");
        paths.push(path);
    }

    match <[PathBuf; 5]>::try_from(paths) {
        Ok([config, preprocessor, tokenizer, encoder, decoder]) => Ok(ModelFiles {
            config,
            preprocessor,
            tokenizer,
            encoder,
            decoder,
        }),
        Err(paths) => Err(EngineError::ModelNotAvailable(format!(
            "{repo}: resolved {} of {} files",
            paths.len(),
            MODEL_FILES.len()
        ))),
    }
}

/// Bridges hub download callbacks to [`ProgressEvent`]s.
///
/// Events are throttled to whole-percent changes so a large file does not
/// flood the message channel.
struct ForwardProgress {
    file: String,
    callback: ProgressCallback,
    loaded: u64,
    total: u64,
    last_percent: Option<u64>,
}

impl ForwardProgress {
    fn new(file: &str, callback: ProgressCallback) -> Self {
        Self {
            file: file.to_string(),
            callback,
            loaded: 0,
            total: 0,
            last_percent: None,
        }
    }

    fn emit(&mut self) {
        let percent = if self.total == 0 {
            100
        } else {
            self.loaded.saturating_mul(100) / self.total
        };
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        (self.callback)(ProgressEvent::progress(
            self.file.clone(),
            self.loaded,
            self.total,
        ));
    }
}

impl Progress for ForwardProgress {
    fn init(&mut self, size: usize, _filename: &str) {
        self.total = size as u64;
        self.loaded = 0;
        self.emit();
    }

    fn update(&mut self, size: usize) {
        self.loaded = self.loaded.saturating_add(size as u64).min(self.total);
        self.emit();
    }

    fn finish(&mut self) {
        self.loaded = self.total;
        self.emit();
        (self.callback)(ProgressEvent::done(self.file.clone()));
    }
}
