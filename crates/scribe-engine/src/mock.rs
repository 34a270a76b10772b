//! Scripted engine, vocabulary and loaders for tests.
//!
//! The mock vocabulary maps each word of a fixed list to one token id and
//! places the special tokens and the timestamp range after the words, the
//! same layout a Whisper vocabulary has.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scribe_core::{ProgressEvent, TokenId};

use crate::engine::{EngineHandle, EngineLoader, ProgressCallback, SpeechEngine, Vocabulary};
use crate::errors::{EngineError, Result};

/// Time precision used by the mocks (Whisper's 30 s / 1500 positions).
pub const MOCK_TIME_PRECISION: f64 = 0.02;

// ─────────────────────────────────────────────────────────────────────────────
// Vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Word-level vocabulary: each word decodes to `" word"`.
#[derive(Debug, Clone)]
pub struct MockVocabulary {
    words: Vec<String>,
}

impl MockVocabulary {
    /// Build a vocabulary from a word list. Token ids follow list order.
    pub fn new<S: AsRef<str>>(words: &[S]) -> Self {
        Self {
            words: words.iter().map(|w| w.as_ref().to_string()).collect(),
        }
    }

    fn base(&self) -> TokenId {
        TokenId::try_from(self.words.len()).unwrap_or(TokenId::MAX - 3)
    }

    /// End-of-text token.
    pub fn eot(&self) -> TokenId {
        self.base()
    }

    /// Start-of-transcript token.
    pub fn sot(&self) -> TokenId {
        self.base() + 1
    }

    /// `<|notimestamps|>` marker.
    pub fn no_timestamps(&self) -> TokenId {
        self.base() + 2
    }

    /// Timestamp token closest to `seconds` (window-relative).
    pub fn timestamp(&self, seconds: f64) -> TokenId {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (seconds / MOCK_TIME_PRECISION).round() as TokenId;
        self.timestamp_begin() + steps
    }

    /// Token ids for a whitespace-separated phrase.
    ///
    /// Panics on words missing from the vocabulary.
    pub fn words(&self, text: &str) -> Vec<TokenId> {
        text.split_whitespace()
            .map(|w| {
                let idx = self
                    .words
                    .iter()
                    .position(|known| known == w)
                    .unwrap_or_else(|| panic!("word {w:?} not in mock vocabulary"));
                TokenId::try_from(idx).unwrap_or(TokenId::MAX)
            })
            .collect()
    }

    /// Full decode output for one window.
    ///
    /// Each segment is `(start_s, end_s, text)`; a `None` end leaves the
    /// segment open, as an engine does when the window cuts a word.
    pub fn window(&self, segments: &[(f64, Option<f64>, &str)]) -> Vec<TokenId> {
        let mut tokens = vec![self.sot()];
        for &(start, end, text) in segments {
            tokens.push(self.timestamp(start));
            tokens.extend(self.words(text));
            if let Some(end) = end {
                tokens.push(self.timestamp(end));
            }
        }
        tokens.push(self.eot());
        tokens
    }
}

impl Vocabulary for MockVocabulary {
    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        let mut out = String::new();
        for &t in tokens {
            let word = usize::try_from(t)
                .ok()
                .and_then(|i| self.words.get(i))
                .ok_or_else(|| EngineError::Tokenizer(format!("unknown token id {t}")))?;
            out.push(' ');
            out.push_str(word);
        }
        Ok(out)
    }

    fn timestamp_begin(&self) -> TokenId {
        self.base() + 3
    }

    fn is_special(&self, token: TokenId) -> bool {
        token >= self.eot() && token < self.timestamp_begin()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

enum Step {
    Tokens(Vec<TokenId>),
    Fail(String),
}

/// Engine that replays scripted window outputs.
///
/// Once the script is exhausted each window decodes to `[sot, eot]`.
pub struct MockEngine {
    model_id: String,
    vocab: Arc<MockVocabulary>,
    script: Mutex<VecDeque<Step>>,
    windows_seen: Mutex<Vec<usize>>,
    delay: Duration,
}

impl MockEngine {
    /// Create an engine with an empty script.
    pub fn new(model_id: impl Into<String>, vocab: MockVocabulary) -> Self {
        Self {
            model_id: model_id.into(),
            vocab: Arc::new(vocab),
            script: Mutex::new(VecDeque::new()),
            windows_seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Queue window outputs, consumed one per `generate` call.
    #[must_use]
    pub fn with_script(self, windows: Vec<Vec<TokenId>>) -> Self {
        self.script
            .lock()
            .extend(windows.into_iter().map(Step::Tokens));
        self
    }

    /// Sleep this long inside every `generate` call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a failing window.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(Step::Fail(message.into()));
    }

    /// The mock vocabulary.
    pub fn mock_vocabulary(&self) -> &MockVocabulary {
        &self.vocab
    }

    /// Sample counts of every window passed to `generate`, in order.
    pub fn windows_seen(&self) -> Vec<usize> {
        self.windows_seen.lock().clone()
    }
}

impl SpeechEngine for MockEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn time_precision(&self) -> f64 {
        MOCK_TIME_PRECISION
    }

    fn vocabulary(&self) -> Arc<dyn Vocabulary> {
        self.vocab.clone()
    }

    fn generate(&self, window: &[f32]) -> Result<Vec<TokenId>> {
        self.windows_seen.lock().push(window.len());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match self.script.lock().pop_front() {
            Some(Step::Tokens(tokens)) => Ok(tokens),
            Some(Step::Fail(message)) => Err(EngineError::Inference(message)),
            None => Ok(vec![self.vocab.sot(), self.vocab.eot()]),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loaders
// ─────────────────────────────────────────────────────────────────────────────

/// Loader that returns a prepared engine after reporting fake downloads.
pub struct MockLoader {
    engine: Arc<MockEngine>,
    files: Vec<(String, u64)>,
    delay: Duration,
    loads: AtomicUsize,
}

impl MockLoader {
    /// Loader for `engine`, reporting no downloads.
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self {
            engine,
            files: Vec::new(),
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    /// Report a download of `file` with `size` bytes during each load.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>, size: u64) -> Self {
        self.files.push((file.into(), size));
        self
    }

    /// Wait this long (async) before completing each load.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many times `load` ran.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for MockLoader {
    async fn load(&self, model: &str, progress: ProgressCallback) -> Result<EngineHandle> {
        let _ = self.loads.fetch_add(1, Ordering::SeqCst);
        if model != self.engine.model_id() {
            return Err(EngineError::UnknownModel(model.to_string()));
        }
        for (file, size) in &self.files {
            progress(ProgressEvent::queued(file.as_str()));
            progress(ProgressEvent::progress(file.as_str(), size / 2, *size));
            progress(ProgressEvent::progress(file.as_str(), *size, *size));
            progress(ProgressEvent::done(file.as_str()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.engine.clone())
    }
}

/// Loader that always fails, as a network or storage failure would.
pub struct FailingLoader {
    message: String,
    attempts: AtomicUsize,
}

impl FailingLoader {
    /// Loader failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// How many times `load` ran.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for FailingLoader {
    async fn load(&self, _model: &str, _progress: ProgressCallback) -> Result<EngineHandle> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::ModelNotAvailable(self.message.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
