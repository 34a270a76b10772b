//! Audio window planning.
//!
//! Splits a sample sequence into overlapping fixed-length windows. Windows
//! start every `window_length_s - stride_s` seconds, so consecutive windows
//! share `stride_s` seconds; the last window is clipped to the audio.
//!
//! ```text
//! 65 s, 30/5:  [0, 30)  [25, 55)  [50, 65)
//! ```
//!
//! Each window carries the overlap it shares with its neighbours as a
//! [`ChunkStride`]: half of `stride_s` on each interior edge, nothing on the
//! outer edges of the first and last window.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::ops::Range;

use scribe_core::{ChunkStride, WindowSpec};

/// One planned window, in samples.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioWindow {
    /// First sample (inclusive).
    pub start: usize,
    /// Last sample (exclusive).
    pub end: usize,
    /// Geometry handed to the stitcher, in seconds.
    pub stride: ChunkStride,
    /// Whether this window reaches the end of the audio.
    pub is_last: bool,
}

impl AudioWindow {
    /// Sample range covered by this window.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the window is empty (never produced by the planner).
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Plan windows over `total_samples` samples at `sample_rate`.
///
/// Returns no windows for empty audio.
pub fn plan_windows(total_samples: usize, spec: &WindowSpec, sample_rate: u32) -> Vec<AudioWindow> {
    let rate = f64::from(sample_rate);
    let window = ((spec.window_length_s() * rate).round() as usize).max(1);
    let stride = ((spec.stride_s() * rate).round() as usize).min(window - 1);
    let step = window - stride;
    let side = stride / 2;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total_samples {
        let end = (start + window).min(total_samples);
        let is_first = start == 0;
        let is_last = end >= total_samples;
        let left = if is_first { 0 } else { side };
        let right = if is_last { 0 } else { side };
        windows.push(AudioWindow {
            start,
            end,
            stride: ChunkStride {
                chunk_len_s: (end - start) as f64 / rate,
                left_s: left as f64 / rate,
                right_s: right as f64 / rate,
            },
            is_last,
        });
        if is_last {
            break;
        }
        start += step;
    }
    windows
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
