//! Whisper ONNX engine.
//!
//! Targets the `optimum` split export (`Xenova/whisper-*` repositories):
//!
//! - `onnx/encoder_model.onnx`: `input_features [1, n_mels, 3000]` →
//!   `last_hidden_state [1, 1500, d_model]`
//! - `onnx/decoder_model.onnx`: `input_ids [1, seq]` +
//!   `encoder_hidden_states` → `logits [1, seq, vocab]`
//! - `tokenizer.json`, `config.json`, `preprocessor_config.json`
//!
//! Decoding is greedy with timestamps enabled; [`rules::TimestampRules`]
//! constrains every step so the output pairs timestamps around text.

pub mod rules;

#[cfg(feature = "ort")]
pub mod config;
#[cfg(feature = "ort")]
pub mod download;
#[cfg(feature = "ort")]
pub mod mel;
#[cfg(feature = "ort")]
pub mod vocab;

#[cfg(feature = "ort")]
pub use engine_impl::{WhisperEngine, WhisperLoader};

#[cfg(feature = "ort")]
mod engine_impl {
    //! ONNX tensor shapes use `i64` dimensions while Rust indexing needs
    //! `usize`; the dimensions involved are small and positive.
    #![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use ort::session::Session;
    use ort::value::{Tensor, TensorRef};
    use parking_lot::Mutex;
    use scribe_core::TokenId;
    use tracing::{debug, info};

    use super::config::{ModelConfig, PreprocessorConfig, read_json};
    use super::download::{self, ModelFiles};
    use super::mel::MelExtractor;
    use super::rules::{TimestampRules, argmax};
    use super::vocab::WhisperVocabulary;
    use crate::catalogue::{self, ModelSpec};
    use crate::engine::{EngineHandle, EngineLoader, ProgressCallback, SpeechEngine, Vocabulary};
    use crate::errors::{EngineError, Result, ResultExt};

    /// Intra-op threads per ONNX session unless configured otherwise.
    const DEFAULT_INTRA_THREADS: usize = 4;
    /// Generated-token cap per window unless configured otherwise.
    const DEFAULT_MAX_NEW_TOKENS: usize = 224;
    /// First timestamp may not exceed 1.0 s (50 steps of 0.02 s).
    const MAX_INITIAL_TIMESTAMP_INDEX: u32 = 50;

    // ─────────────────────────────────────────────────────────────────────
    // Loader
    // ─────────────────────────────────────────────────────────────────────

    /// Downloads (or reuses) a Whisper export and builds a [`WhisperEngine`].
    #[derive(Clone, Debug)]
    pub struct WhisperLoader {
        cache_dir: PathBuf,
        intra_threads: usize,
        max_new_tokens: usize,
    }

    impl WhisperLoader {
        /// Loader storing model files under `cache_dir`.
        pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
            Self {
                cache_dir: cache_dir.into(),
                intra_threads: DEFAULT_INTRA_THREADS,
                max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            }
        }

        /// Intra-op thread count for the encoder session.
        #[must_use]
        pub fn with_intra_threads(mut self, threads: usize) -> Self {
            self.intra_threads = threads.max(1);
            self
        }

        /// Cap on generated tokens per window.
        #[must_use]
        pub fn with_max_new_tokens(mut self, tokens: usize) -> Self {
            self.max_new_tokens = tokens.max(1);
            self
        }
    }

    #[async_trait]
    impl EngineLoader for WhisperLoader {
        async fn load(&self, model: &str, progress: ProgressCallback) -> Result<EngineHandle> {
            let spec = catalogue::lookup(model)?;
            let loader = self.clone();
            let requested = model.to_string();
            let engine = tokio::task::spawn_blocking(move || {
                let files = download::ensure_model(&loader.cache_dir, spec.repo, &progress)?;
                let mut engine =
                    WhisperEngine::load(spec, &files, loader.intra_threads, loader.max_new_tokens)?;
                // Report the identifier the caller asked for, alias or not.
                engine.model_id = requested;
                Ok::<_, EngineError>(engine)
            })
            .await
            .model("load task")??;
            Ok(Arc::new(engine))
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Engine
    // ─────────────────────────────────────────────────────────────────────

    /// Encoder and decoder sessions plus everything needed to decode a window.
    ///
    /// Sessions sit behind mutexes because `Session::run` takes `&mut self`.
    pub struct WhisperEngine {
        model_id: String,
        encoder: Mutex<Session>,
        decoder: Mutex<Session>,
        vocab: Arc<WhisperVocabulary>,
        mel: MelExtractor,
        rules: TimestampRules,
        time_precision: f64,
        max_new_tokens: usize,
    }

    impl std::fmt::Debug for WhisperEngine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("WhisperEngine")
                .field("model_id", &self.model_id)
                .field("time_precision", &self.time_precision)
                .field("max_new_tokens", &self.max_new_tokens)
                .finish_non_exhaustive()
        }
    }

    impl WhisperEngine {
        /// Build sessions from local model files (blocking, CPU heavy).
        pub fn load(
            spec: &ModelSpec,
            files: &ModelFiles,
            intra_threads: usize,
            max_new_tokens: usize,
        ) -> Result<Self> {
            info!(model = spec.id, "loading whisper sessions");
            let model_config: ModelConfig = read_json(&files.config)?;
            let preprocessor: PreprocessorConfig = read_json(&files.preprocessor)?;

            let encoder = Session::builder()
                .inference("session builder")?
                .with_intra_threads(intra_threads)
                .inference("set threads")?
                .commit_from_file(&files.encoder)
                .inference("load encoder")?;
            debug!("loaded encoder");

            // Decoder steps are sequential and small.
            let decoder = Session::builder()
                .inference("session builder")?
                .with_intra_threads(1)
                .inference("set threads")?
                .commit_from_file(&files.decoder)
                .inference("load decoder")?;
            debug!("loaded decoder");

            let vocab = WhisperVocabulary::from_file(&files.tokenizer, spec.english_only)?;
            let rules = TimestampRules {
                eot: vocab.eot(),
                timestamp_begin: vocab.timestamp_begin(),
                max_initial_timestamp_index: Some(MAX_INITIAL_TIMESTAMP_INDEX),
            };
            let budget = model_config
                .max_target_positions
                .saturating_sub(vocab.prompt().len());
            let time_precision = preprocessor.time_precision(&model_config);

            info!(
                model = spec.id,
                time_precision,
                timestamp_begin = rules.timestamp_begin,
                "whisper engine ready"
            );

            Ok(Self {
                model_id: spec.id.to_string(),
                encoder: Mutex::new(encoder),
                decoder: Mutex::new(decoder),
                vocab: Arc::new(vocab),
                mel: MelExtractor::new(&preprocessor),
                rules,
                time_precision,
                max_new_tokens: max_new_tokens.min(budget),
            })
        }

        /// Run the encoder; returns `(frames, d_model, hidden_states)`.
        fn encode(&self, window: &[f32]) -> Result<(usize, usize, Vec<f32>)> {
            let features = self.mel.compute(window);
            let shape = [1_i64, self.mel.n_mels() as i64, self.mel.n_frames() as i64];
            let data: Vec<f32> = features.iter().copied().collect();
            let input = Tensor::from_array((shape, data)).inference("features tensor")?;

            let mut encoder = self.encoder.lock();
            let outputs = encoder
                .run(ort::inputs!["input_features" => input])
                .inference("encoder run")?;
            let (shape, hidden) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .inference("extract hidden states")?;
            if shape.len() != 3 {
                return Err(EngineError::Inference(format!(
                    "unexpected encoder output rank {}",
                    shape.len()
                )));
            }
            Ok((shape[1] as usize, shape[2] as usize, hidden.to_vec()))
        }

        /// Logits for the next token given the full sequence so far.
        fn next_logits(
            &self,
            tokens: &[i64],
            frames: usize,
            d_model: usize,
            hidden: &[f32],
        ) -> Result<Vec<f32>> {
            let seq = tokens.len();
            let input_ids =
                TensorRef::from_array_view(([1_i64, seq as i64], tokens)).inference("input_ids")?;
            let hidden_states =
                TensorRef::from_array_view(([1_i64, frames as i64, d_model as i64], hidden))
                    .inference("encoder_hidden_states")?;

            let mut decoder = self.decoder.lock();
            let outputs = decoder
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "encoder_hidden_states" => hidden_states,
                ])
                .inference("decoder run")?;
            let (_, logits) = outputs["logits"]
                .try_extract_tensor::<f32>()
                .inference("extract logits")?;

            let vocab_size = logits.len() / seq.max(1);
            let start = (seq - 1) * vocab_size;
            logits
                .get(start..start + vocab_size)
                .map(<[f32]>::to_vec)
                .ok_or_else(|| EngineError::Inference("logits shorter than sequence".into()))
        }
    }

    impl SpeechEngine for WhisperEngine {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn time_precision(&self) -> f64 {
            self.time_precision
        }

        fn vocabulary(&self) -> Arc<dyn Vocabulary> {
            self.vocab.clone()
        }

        fn generate(&self, window: &[f32]) -> Result<Vec<TokenId>> {
            let (frames, d_model, hidden) = self.encode(window)?;

            let prompt = self.vocab.prompt();
            let mut tokens: Vec<TokenId> = prompt.to_vec();
            let mut input: Vec<i64> = prompt.iter().map(|&t| i64::from(t)).collect();

            for _ in 0..self.max_new_tokens {
                let mut logits = self.next_logits(&input, frames, d_model, &hidden)?;
                self.rules.apply(&mut logits, &tokens[prompt.len()..]);
                let next = TokenId::try_from(argmax(&logits))
                    .map_err(|e| EngineError::Inference(format!("token id overflow: {e}")))?;

                tokens.push(next);
                input.push(i64::from(next));
                if next == self.rules.eot {
                    break;
                }
            }

            debug!(
                samples = window.len(),
                generated = tokens.len() - prompt.len(),
                "window decoded"
            );
            Ok(tokens)
        }
    }

}
