//! Timestamped merge of overlapping window outputs.
//!
//! Every window is decoded independently, so the words inside an overlap
//! region appear twice: once at the tail of one window and once at the head
//! of the next. The stitcher walks every window's tokens on a single global
//! timeline, drops the timestamp pairs that fall in the right overlap of a
//! window (the next window covers them with more context), and resolves the
//! duplicated text runs by aligning them on their longest common sequence.
//!
//! The whole history is re-stitched on every call, so the output for a given
//! history never depends on what was stitched before.

use scribe_core::{RawChunk, TokenId};
use scribe_engine::Vocabulary;

use crate::errors::{PipelineError, Result};

/// One stitched segment on the global timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedChunk {
    /// Decoded text, untrimmed.
    pub text: String,
    /// Start and end in seconds, rounded to two decimals. The end is absent
    /// when the last window stopped mid-segment.
    pub timestamp: (Option<f64>, Option<f64>),
}

impl MergedChunk {
    fn empty() -> Self {
        Self {
            text: String::new(),
            timestamp: (None, None),
        }
    }
}

/// Stitch the full window history into timestamped segments.
///
/// Leftover text after the final timestamp becomes a trailing segment with
/// an open end.
pub fn stitch(
    history: &[RawChunk],
    vocab: &dyn Vocabulary,
    time_precision: f64,
) -> Result<Vec<MergedChunk>> {
    if !time_precision.is_finite() || time_precision <= 0.0 {
        return Err(PipelineError::Stitch(format!(
            "time precision must be positive, got {time_precision}"
        )));
    }

    let timestamp_begin = vocab.timestamp_begin();
    let ts_index = |token: TokenId| f64::from(token - timestamp_begin);

    let mut chunks = Vec::new();
    let mut chunk = MergedChunk::empty();
    let mut time_offset = 0.0_f64;
    let mut previous_tokens: Vec<Vec<TokenId>> = Vec::new();
    let mut skip = false;

    for (n, raw) in history.iter().enumerate() {
        let stride = raw.stride;
        if !stride.is_well_formed() {
            return Err(PipelineError::Stitch(format!(
                "window {n} has malformed stride {stride:?}"
            )));
        }

        time_offset -= stride.left_s;
        let right_stride_start = stride.chunk_len_s - stride.right_s;

        let first_timestamp = if stride.left_s > 0.0 {
            stride.left_s / time_precision + f64::from(timestamp_begin)
        } else {
            f64::from(timestamp_begin)
        };

        // Last timestamp whose time precedes the right overlap, found from
        // the end; timestamps at or after it belong to the next window.
        let mut last_timestamp: Option<TokenId> = None;
        if stride.right_s > 0.0 {
            for &token in raw.tokens.iter().rev() {
                if token >= timestamp_begin {
                    if last_timestamp.is_some()
                        && ts_index(token) * time_precision < right_stride_start
                    {
                        break;
                    }
                    last_timestamp = Some(token);
                }
            }
        }

        let mut current_tokens: Vec<TokenId> = Vec::new();
        for &token in &raw.tokens {
            if vocab.is_special(token) {
                continue;
            }
            if token < timestamp_begin {
                current_tokens.push(token);
                continue;
            }

            let time = round2(ts_index(token) * time_precision + time_offset);
            if last_timestamp.is_some_and(|last| token >= last) {
                skip = true;
            } else if skip
                || (!previous_tokens.is_empty() && f64::from(token) < first_timestamp)
            {
                skip = false;
            } else if chunk.timestamp.0.is_none() {
                chunk.timestamp.0 = Some(time);
            } else if chunk.timestamp.0 == Some(time) {
                // Zero-length segment.
            } else {
                chunk.timestamp.1 = Some(time);
                previous_tokens.push(std::mem::take(&mut current_tokens));
                let resolved = longest_common_sequence(&previous_tokens)?;
                chunk.text = decode(vocab, &resolved)?;
                chunks.push(std::mem::replace(&mut chunk, MergedChunk::empty()));
                previous_tokens.clear();
            }
        }

        time_offset += stride.chunk_len_s - stride.right_s;

        if !current_tokens.is_empty() {
            previous_tokens.push(current_tokens);
        } else if previous_tokens.iter().all(Vec::is_empty) {
            chunk = MergedChunk::empty();
            previous_tokens.clear();
        }
    }

    if !previous_tokens.is_empty() {
        let resolved = longest_common_sequence(&previous_tokens)?;
        chunk.text = decode(vocab, &resolved)?;
        chunks.push(chunk);
    }

    Ok(chunks)
}

/// Merge consecutive token runs that overlap at their boundaries.
///
/// Each right run is slid across the tail of the accumulated left run; the
/// alignment with the best `matches / overlap` score (ties broken towards
/// longer overlaps, at least two matching tokens) wins, and both runs are
/// cut at the midpoint of the aligned region.
pub fn longest_common_sequence(sequences: &[Vec<TokenId>]) -> Result<Vec<TokenId>> {
    let Some((first, rest)) = sequences.split_first() else {
        return Ok(Vec::new());
    };

    let mut left_sequence: &[TokenId] = first;
    let mut total = Vec::new();

    for right_sequence in rest {
        let left_len = left_sequence.len();
        let right_len = right_sequence.len();
        let mut best = 0.0_f64;
        let mut best_indices = (left_len, left_len, 0, 0);

        for j in 1..left_len + right_len {
            #[allow(clippy::cast_precision_loss)]
            let eps = j as f64 / 10_000.0;
            let left_start = left_len.saturating_sub(j);
            let left_stop = left_len.min(left_len + right_len - j);
            let right_start = j.saturating_sub(left_len);
            let right_stop = right_len.min(j);

            let left = &left_sequence[left_start..left_stop];
            let right = &right_sequence[right_start..right_stop];
            if left.len() != right.len() {
                return Err(PipelineError::Stitch(format!(
                    "misaligned overlap: {} vs {} tokens",
                    left.len(),
                    right.len()
                )));
            }

            let matches = left.iter().zip(right).filter(|(a, b)| a == b).count();
            #[allow(clippy::cast_precision_loss)]
            let matching = matches as f64 / j as f64 + eps;
            if matches > 1 && matching > best {
                best = matching;
                best_indices = (left_start, left_stop, right_start, right_stop);
            }
        }

        let (left_start, left_stop, right_start, right_stop) = best_indices;
        let left_mid = (left_start + left_stop) / 2;
        let right_mid = (right_start + right_stop) / 2;
        total.extend_from_slice(&left_sequence[..left_mid]);
        left_sequence = &right_sequence[right_mid..];
    }

    total.extend_from_slice(left_sequence);
    Ok(total)
}

fn decode(vocab: &dyn Vocabulary, tokens: &[TokenId]) -> Result<String> {
    vocab
        .decode(tokens)
        .map_err(|e| PipelineError::Stitch(e.to_string()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
