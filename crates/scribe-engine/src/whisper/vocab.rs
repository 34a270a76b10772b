//! Whisper vocabulary over a Hugging Face `tokenizer.json`.

use std::path::Path;

use scribe_core::TokenId;
use tokenizers::Tokenizer;

use crate::engine::Vocabulary;
use crate::errors::{EngineError, Result, ResultExt};

const EOT: &str = "<|endoftext|>";
const SOT: &str = "<|startoftranscript|>";
const NO_TIMESTAMPS: &str = "<|notimestamps|>";
const FIRST_TIMESTAMP: &str = "<|0.00|>";
const ENGLISH: &str = "<|en|>";
const TRANSCRIBE: &str = "<|transcribe|>";

/// Token layout and text decoding for one Whisper checkpoint.
pub struct WhisperVocabulary {
    tokenizer: Tokenizer,
    eot: TokenId,
    timestamp_begin: TokenId,
    prompt: Vec<TokenId>,
}

impl WhisperVocabulary {
    /// Load `tokenizer.json` and resolve the special tokens.
    ///
    /// English-only checkpoints are prompted with `<|startoftranscript|>`
    /// alone; multilingual ones add `<|en|><|transcribe|>`.
    pub fn from_file(path: &Path, english_only: bool) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).model("load tokenizer.json")?;
        let id = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| EngineError::ModelNotAvailable(format!("tokenizer lacks {token}")))
        };

        let eot = id(EOT)?;
        let sot = id(SOT)?;
        let timestamp_begin = match tokenizer.token_to_id(NO_TIMESTAMPS) {
            Some(no_ts) => no_ts + 1,
            None => id(FIRST_TIMESTAMP)?,
        };
        let prompt = if english_only {
            vec![sot]
        } else {
            vec![sot, id(ENGLISH)?, id(TRANSCRIBE)?]
        };

        Ok(Self {
            tokenizer,
            eot,
            timestamp_begin,
            prompt,
        })
    }

    /// End-of-text token.
    pub fn eot(&self) -> TokenId {
        self.eot
    }

    /// Decoder prompt (start-of-transcript plus language/task markers).
    pub fn prompt(&self) -> &[TokenId] {
        &self.prompt
    }
}

impl Vocabulary for WhisperVocabulary {
    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        self.tokenizer
            .decode(tokens, false)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))
    }

    fn timestamp_begin(&self) -> TokenId {
        self.timestamp_begin
    }

    fn is_special(&self, token: TokenId) -> bool {
        token >= self.eot && token < self.timestamp_begin
    }
}
