//! Logit constraints that keep greedy decoding timestamp-well-formed.
//!
//! Whisper emits timestamps in pairs around each text segment. Left to pure
//! argmax it can emit unpaired or decreasing timestamps, which the stitcher
//! cannot place on a timeline. These rules, applied before every argmax, make
//! the output well-formed:
//!
//! - special tokens other than end-of-text are never generated
//! - the first generated token is a timestamp no later than the initial limit
//! - timestamps come in pairs and never decrease
//! - when the total timestamp probability beats every text token, a
//!   timestamp is forced

use scribe_core::TokenId;

/// Greedy decoding constraints for one vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampRules {
    /// End-of-text token.
    pub eot: TokenId,
    /// First timestamp token.
    pub timestamp_begin: TokenId,
    /// Largest timestamp index allowed as the first token (50 = 1.0 s).
    pub max_initial_timestamp_index: Option<u32>,
}

impl TimestampRules {
    /// Mask `logits` in place given the tokens generated after the prompt.
    pub fn apply(&self, logits: &mut [f32], generated: &[TokenId]) {
        let n = logits.len();
        let eot = self.eot as usize;
        let tb = (self.timestamp_begin as usize).min(n);

        suppress(logits, (eot + 1).min(tb), tb);

        let is_ts = |t: TokenId| t >= self.timestamp_begin;
        let last_was_ts = generated.last().is_some_and(|&t| is_ts(t));
        let penultimate_was_ts = generated.len() < 2 || is_ts(generated[generated.len() - 2]);

        if last_was_ts {
            if penultimate_was_ts {
                suppress(logits, tb, n);
            } else {
                suppress(logits, 0, eot.min(n));
            }
        }

        if let Some(&last_ts) = generated.iter().rev().find(|&&t| is_ts(t)) {
            let floor = if last_was_ts && !penultimate_was_ts {
                last_ts
            } else {
                last_ts + 1
            };
            suppress(logits, tb, (floor as usize).min(n));
        }

        if generated.is_empty() {
            suppress(logits, 0, tb);
            if let Some(max_index) = self.max_initial_timestamp_index {
                suppress(logits, (tb + max_index as usize + 1).min(n), n);
            }
        }

        let timestamp_mass = log_sum_exp(&logits[tb..]);
        let best_text = logits[..tb]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if timestamp_mass > best_text {
            suppress(logits, 0, tb);
        }
    }
}

fn suppress(logits: &mut [f32], from: usize, to: usize) {
    if from < to {
        for l in &mut logits[from..to] {
            *l = f32::NEG_INFINITY;
        }
    }
}

fn log_sum_exp(values: &[f32]) -> f32 {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return max;
    }
    let sum: f32 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Index of the largest value (first on ties, NaN ignored).
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
