//! Transcript snapshots.
//!
//! A [`Transcript`] is the ordered list of [`ProcessedChunk`]s the pipeline
//! has stitched so far. Every snapshot is recomputed from scratch, so a later
//! snapshot may revise text or boundaries of earlier chunks.

use serde::{Deserialize, Serialize};

/// One stitched, whole-second-rounded transcript segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedChunk {
    /// Position in the transcript (emission order).
    pub index: u32,
    /// Segment text with surrounding whitespace trimmed.
    pub text: String,
    /// Start time in whole seconds.
    #[serde(rename = "start")]
    pub start_s: u32,
    /// End time in whole seconds.
    #[serde(rename = "end")]
    pub end_s: u32,
}

/// Ordered transcript segments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    chunks: Vec<ProcessedChunk>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Running cursor: end of the last segment, or 0 when empty.
    pub fn cursor(&self) -> u32 {
        self.chunks.last().map_or(0, |c| c.end_s)
    }

    /// Segments in order.
    pub fn chunks(&self) -> &[ProcessedChunk] {
        &self.chunks
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the transcript has no segments.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Segment texts joined by single spaces.
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether end times never decrease from one segment to the next.
    pub fn is_monotonic(&self) -> bool {
        self.chunks.windows(2).all(|w| w[1].end_s >= w[0].end_s)
    }
}

impl From<Vec<ProcessedChunk>> for Transcript {
    fn from(chunks: Vec<ProcessedChunk>) -> Self {
        Self { chunks }
    }
}

impl IntoIterator for Transcript {
    type Item = ProcessedChunk;
    type IntoIter = std::vec::IntoIter<ProcessedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ProcessedChunk;
    type IntoIter = std::slice::Iter<'a, ProcessedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u32, text: &str, start_s: u32, end_s: u32) -> ProcessedChunk {
        ProcessedChunk {
            index,
            text: text.into(),
            start_s,
            end_s,
        }
    }

    #[test]
    fn empty_cursor_is_zero() {
        let t = Transcript::new();
        assert_eq!(t.cursor(), 0);
        assert!(t.is_empty());
        assert!(t.is_monotonic());
    }

    #[test]
    fn cursor_is_last_end() {
        let t = Transcript::from(vec![chunk(0, "a", 0, 4), chunk(1, "b", 4, 9)]);
        assert_eq!(t.cursor(), 9);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn text_skips_empty_segments() {
        let t = Transcript::from(vec![
            chunk(0, "Hello", 0, 1),
            chunk(1, "", 1, 2),
            chunk(2, "world.", 2, 3),
        ]);
        assert_eq!(t.text(), "Hello world.");
    }

    #[test]
    fn detects_decreasing_end() {
        let t = Transcript::from(vec![chunk(0, "a", 0, 10), chunk(1, "b", 5, 8)]);
        assert!(!t.is_monotonic());
    }

    #[test]
    fn serializes_as_array_with_start_end_keys() {
        let t = Transcript::from(vec![chunk(0, "Hi", 0, 2)]);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"index": 0, "text": "Hi", "start": 0, "end": 2}])
        );
    }
}
