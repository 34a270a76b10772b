//! Engine output units.
//!
//! A [`RawChunk`] is what the engine produces for one processed window: the
//! generated token ids (text, special, and timestamp tokens interleaved) plus
//! the window geometry the stitcher needs to place those tokens on the global
//! timeline.

use serde::{Deserialize, Serialize};

/// Token id in the engine's vocabulary.
pub type TokenId = u32;

/// Geometry of one window, in seconds.
///
/// `left_s` and `right_s` are the overlap regions shared with the previous
/// and next window. Tokens timestamped inside them are resolved against the
/// neighbouring window during stitching.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStride {
    /// Length of the window.
    pub chunk_len_s: f64,
    /// Overlap shared with the previous window (0 for the first window).
    pub left_s: f64,
    /// Overlap shared with the next window (0 for the last window).
    pub right_s: f64,
}

impl ChunkStride {
    /// Whether the geometry is usable for stitching.
    ///
    /// All values must be finite and non-negative, and the two overlaps must
    /// fit inside the window.
    pub fn is_well_formed(&self) -> bool {
        let values = [self.chunk_len_s, self.left_s, self.right_s];
        values.iter().all(|v| v.is_finite() && *v >= 0.0)
            && self.chunk_len_s > 0.0
            && self.left_s + self.right_s < self.chunk_len_s
    }
}

/// Raw decode output for one window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChunk {
    /// Generated token ids, in decode order.
    pub tokens: Vec<TokenId>,
    /// Window geometry.
    pub stride: ChunkStride,
    /// Whether this is the final window of the audio.
    pub is_last: bool,
}
