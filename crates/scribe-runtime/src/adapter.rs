//! Engine adapter: single-flight engine loading and windowed transcription.
//!
//! The adapter owns the process-wide engine. The first call loads it (with
//! download progress forwarded as `Downloading` messages); concurrent callers
//! wait for that load, later callers reuse the result. A failed load leaves
//! the slot empty so a later call can try again.
//!
//! At most one transcription runs at a time. The caller acquires a
//! [`TranscriptionPermit`] first; a second caller is rejected with
//! [`PipelineError::Busy`] instead of queueing.
//!
//! Message order for one call:
//!
//! ```text
//! Queued → LoadingModel → Downloading* → ModelReady → Result* → Done
//! ```
//!
//! `Failed` may replace any suffix of that sequence and is always last.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, StreamExt, stream};
use scribe_core::{ProgressEvent, RawChunk, SAMPLE_RATE, Transcript, WindowSpec, WorkerMessage};
use scribe_engine::{EngineError, EngineHandle, EngineLoader, ProgressCallback};
use tokio::sync::{OnceCell, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::planner::plan_windows;
use crate::tracker::{GenerationTracker, MessageSink};

/// Finite stream of protocol messages for one call, ending with `Done` or
/// `Failed`.
pub type MessageStream = Pin<Box<dyn Stream<Item = WorkerMessage> + Send>>;

/// Shared engine slot plus the single-flight transcription guard.
pub struct EngineAdapter {
    loader: Arc<dyn EngineLoader>,
    engine: OnceCell<EngineHandle>,
    busy: AtomicBool,
    window: WindowSpec,
}

impl EngineAdapter {
    /// Adapter loading engines through `loader` and splitting audio with
    /// `window`.
    pub fn new(loader: Arc<dyn EngineLoader>, window: WindowSpec) -> Self {
        Self {
            loader,
            engine: OnceCell::new(),
            busy: AtomicBool::new(false),
            window,
        }
    }

    /// Window policy used for every call.
    pub fn window(&self) -> WindowSpec {
        self.window
    }

    /// Identifier of the loaded model, if any.
    pub fn loaded_model(&self) -> Option<&str> {
        self.engine.get().map(|e| e.model_id())
    }

    /// Whether a transcription is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Return the engine, loading it on first use.
    ///
    /// Only the call that performs the load sees `progress` callbacks.
    /// Requesting a model other than the loaded one fails with
    /// [`EngineError::ModelMismatch`].
    pub async fn get_engine(&self, model: &str, progress: ProgressCallback) -> Result<EngineHandle> {
        let engine = self
            .engine
            .get_or_try_init(|| async move {
                info!(model, "loading engine");
                let engine = self.loader.load(model, progress).await;
                match &engine {
                    Ok(_) => info!(model, "engine loaded"),
                    Err(e) => warn!(model, error = %e, "engine load failed"),
                }
                engine
            })
            .await?;

        if engine.model_id() != model {
            return Err(EngineError::ModelMismatch {
                requested: model.to_string(),
                loaded: engine.model_id().to_string(),
            }
            .into());
        }
        Ok(Arc::clone(engine))
    }

    /// Claim the single transcription slot.
    pub fn try_acquire(self: &Arc<Self>) -> Result<TranscriptionPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        Ok(TranscriptionPermit {
            adapter: Arc::clone(self),
        })
    }

    /// Transcribe `audio`, emitting protocol messages to `sink`.
    ///
    /// Every failure, `Busy` included, is also emitted as a terminal `Failed`.
    pub async fn transcribe(
        self: &Arc<Self>,
        audio: Vec<f32>,
        model: &str,
        cancel: CancellationToken,
        sink: MessageSink,
    ) -> Result<Transcript> {
        match self.try_acquire() {
            Ok(permit) => permit.run(audio, model, cancel, sink).await,
            Err(e) => {
                warn!(model, "rejecting transcription: busy");
                let _ = sink.send(e.to_message());
                Err(e)
            }
        }
    }

    /// Lazy message stream for one call.
    ///
    /// Nothing starts until the stream is first polled. Dropping the stream
    /// stops the call at the next window boundary.
    pub fn stream(self: &Arc<Self>, audio: Vec<f32>, model: impl Into<String>) -> MessageStream {
        let adapter = Arc::clone(self);
        let model = model.into();
        let start = async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tokio::spawn(async move {
                let _ = adapter
                    .transcribe(audio, &model, CancellationToken::new(), tx)
                    .await;
            });
            UnboundedReceiverStream::new(rx)
        };
        Box::pin(stream::once(start).flatten())
    }

    async fn run_windows(
        &self,
        audio: Vec<f32>,
        model: &str,
        cancel: &CancellationToken,
        sink: &MessageSink,
    ) -> Result<GenerationTracker> {
        let _ = sink.send(WorkerMessage::Queued);
        validate_audio(&audio)?;

        let _ = sink.send(WorkerMessage::LoadingModel {
            model: model.to_string(),
        });
        let progress_sink = sink.clone();
        let progress: ProgressCallback = Arc::new(move |event: ProgressEvent| {
            if let Some(message) = event.to_downloading() {
                let _ = progress_sink.send(message);
            }
        });
        let engine = self.get_engine(model, progress).await?;
        let _ = sink.send(WorkerMessage::ModelReady {
            model: model.to_string(),
        });

        let windows = plan_windows(audio.len(), &self.window, SAMPLE_RATE);
        info!(
            model,
            samples = audio.len(),
            windows = windows.len(),
            "transcription started"
        );

        let audio: Arc<[f32]> = audio.into();
        let mut tracker = GenerationTracker::new(
            engine.vocabulary(),
            engine.time_precision(),
            self.window.stride_s(),
            sink.clone(),
        );

        for (n, window) in windows.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if sink.is_closed() {
                debug!(window = n, "receiver dropped; stopping");
                return Err(PipelineError::Cancelled);
            }

            let engine = Arc::clone(&engine);
            let samples = Arc::clone(&audio);
            let range = window.range();
            let tokens = tokio::task::spawn_blocking(move || engine.generate(&samples[range]))
                .await
                .map_err(|e| PipelineError::Join(e.to_string()))??;
            debug!(window = n, tokens = tokens.len(), "window generated");

            tracker.on_chunk(RawChunk {
                tokens,
                stride: window.stride,
                is_last: window.is_last,
            })?;
        }

        Ok(tracker)
    }
}

/// Exclusive right to run one transcription. Dropping it frees the slot.
pub struct TranscriptionPermit {
    adapter: Arc<EngineAdapter>,
}

impl TranscriptionPermit {
    /// Run the call to completion, emitting every message to `sink`.
    ///
    /// The slot is released before the terminal message is sent, so a host
    /// reacting to `Done` or `Failed` can start the next call immediately.
    pub async fn run(
        self,
        audio: Vec<f32>,
        model: &str,
        cancel: CancellationToken,
        sink: MessageSink,
    ) -> Result<Transcript> {
        let adapter = Arc::clone(&self.adapter);
        let outcome = adapter.run_windows(audio, model, &cancel, &sink).await;
        drop(self);

        match outcome {
            Ok(tracker) => {
                let transcript = tracker.on_complete();
                info!(model, segments = transcript.len(), "transcription done");
                Ok(transcript)
            }
            Err(e) => {
                warn!(model, reason = %e.reason(), error = %e, "transcription failed");
                let _ = sink.send(e.to_message());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for TranscriptionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionPermit")
            .field("model", &self.adapter.loaded_model())
            .finish_non_exhaustive()
    }
}

impl Drop for TranscriptionPermit {
    fn drop(&mut self) {
        self.adapter.busy.store(false, Ordering::Release);
    }
}

fn validate_audio(audio: &[f32]) -> Result<()> {
    if audio.is_empty() {
        return Err(PipelineError::InvalidAudio("no samples".into()));
    }
    if let Some(i) = audio.iter().position(|s| !s.is_finite()) {
        return Err(PipelineError::InvalidAudio(format!(
            "sample {i} is not finite"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
