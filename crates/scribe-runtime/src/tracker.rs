//! Incremental transcript tracking.
//!
//! The tracker keeps every window's raw output and, after each new window,
//! re-stitches the whole history into a fresh [`Transcript`]. Later windows
//! can therefore revise text and boundaries near earlier overlaps.

use std::sync::Arc;

use scribe_core::{ProcessedChunk, RawChunk, Transcript, WorkerMessage};
use scribe_engine::Vocabulary;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::stitch::{MergedChunk, stitch};

/// Ordered sink for protocol messages of one call.
pub type MessageSink = mpsc::UnboundedSender<WorkerMessage>;

/// Stitches window outputs into transcript snapshots and emits them.
pub struct GenerationTracker {
    history: Vec<RawChunk>,
    vocab: Arc<dyn Vocabulary>,
    time_precision: f64,
    stride_s: f64,
    transcript: Transcript,
    cursor: u32,
    sink: MessageSink,
}

impl GenerationTracker {
    /// Tracker for one call.
    ///
    /// `stride_s` is the window overlap used for the missing-end fallback.
    pub fn new(
        vocab: Arc<dyn Vocabulary>,
        time_precision: f64,
        stride_s: f64,
        sink: MessageSink,
    ) -> Self {
        Self {
            history: Vec::new(),
            vocab,
            time_precision,
            stride_s,
            transcript: Transcript::new(),
            cursor: 0,
            sink,
        }
    }

    /// Record one window and emit the recomputed transcript.
    ///
    /// On failure the window is dropped from history and the previous
    /// transcript is kept.
    pub fn on_chunk(&mut self, chunk: RawChunk) -> Result<()> {
        self.history.push(chunk);
        let merged = match stitch(&self.history, self.vocab.as_ref(), self.time_precision) {
            Ok(merged) => merged,
            Err(e) => {
                let _ = self.history.pop();
                warn!(windows = self.history.len(), error = %e, "stitch failed");
                return Err(e);
            }
        };

        self.transcript = to_transcript(&merged, self.stride_s, self.cursor);
        self.cursor = self.transcript.cursor();
        debug!(
            windows = self.history.len(),
            segments = self.transcript.len(),
            cursor = self.cursor,
            "transcript updated"
        );

        let _ = self.sink.send(WorkerMessage::Result {
            transcript: self.transcript.clone(),
            done: false,
            cursor: self.cursor,
        });
        Ok(())
    }

    /// Emit `Done` with the final transcript and return it.
    pub fn on_complete(self) -> Transcript {
        let _ = self.sink.send(WorkerMessage::Done {
            transcript: self.transcript.clone(),
        });
        self.transcript
    }

    /// Current transcript snapshot.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Windows recorded so far.
    pub fn windows(&self) -> usize {
        self.history.len()
    }
}

/// Map stitched segments to whole-second transcript chunks.
///
/// A missing end falls back to `start + 0.9 * stride_s`; a missing start
/// falls back to the previous segment's end. Ends never move backwards, a
/// start never lies after its end, and the last end is at least `floor`.
pub fn to_transcript(merged: &[MergedChunk], stride_s: f64, floor: u32) -> Transcript {
    let mut previous_end = 0_u32;
    let mut chunks = Vec::with_capacity(merged.len());

    for (index, m) in merged.iter().enumerate() {
        let start = m.timestamp.0.unwrap_or(f64::from(previous_end));
        let end = m
            .timestamp
            .1
            .map_or_else(|| whole_seconds(start + 0.9 * stride_s), whole_seconds);
        let mut end = end.max(previous_end);
        if index + 1 == merged.len() {
            end = end.max(floor);
        }

        chunks.push(ProcessedChunk {
            index: u32::try_from(index).unwrap_or(u32::MAX),
            text: m.text.trim().to_string(),
            start_s: whole_seconds(start).min(end),
            end_s: end,
        });
        previous_end = end;
    }

    Transcript::from(chunks)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_seconds(seconds: f64) -> u32 {
    if seconds.is_finite() {
        seconds.round().clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::planner::plan_windows;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use scribe_core::{ChunkStride, WindowSpec};
    use scribe_engine::mock::{MOCK_TIME_PRECISION, MockVocabulary};

    fn merged(text: &str, start: Option<f64>, end: Option<f64>) -> MergedChunk {
        MergedChunk {
            text: text.into(),
            timestamp: (start, end),
        }
    }

    fn vocab() -> MockVocabulary {
        MockVocabulary::new(&["one", "two", "three", "four"])
    }

    fn tracker(
        v: MockVocabulary,
    ) -> (GenerationTracker, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            GenerationTracker::new(Arc::new(v), MOCK_TIME_PRECISION, 5.0, tx),
            rx,
        )
    }

    fn raw(tokens: Vec<u32>, chunk_len_s: f64) -> RawChunk {
        RawChunk {
            tokens,
            stride: ChunkStride {
                chunk_len_s,
                left_s: 0.0,
                right_s: 0.0,
            },
            is_last: true,
        }
    }

    #[test]
    fn missing_end_falls_back_to_stride() {
        let t = to_transcript(&[merged(" hello", Some(10.0), None)], 5.0, 0);
        assert_eq!(t.chunks()[0].start_s, 10);
        assert_eq!(t.chunks()[0].end_s, 15);
        assert_eq!(t.chunks()[0].text, "hello");
    }

    #[test]
    fn missing_start_uses_previous_end() {
        let t = to_transcript(
            &[merged("a", Some(0.0), Some(4.2)), merged("b", None, Some(7.6))],
            5.0,
            0,
        );
        assert_eq!(t.chunks()[1].start_s, 4);
        assert_eq!(t.chunks()[1].end_s, 8);
    }

    #[test]
    fn ends_never_decrease() {
        let t = to_transcript(
            &[merged("a", Some(0.0), Some(9.0)), merged("b", Some(6.0), Some(7.0))],
            5.0,
            0,
        );
        assert!(t.is_monotonic());
        assert_eq!(t.cursor(), 9);
    }

    #[test]
    fn last_end_respects_floor() {
        let t = to_transcript(&[merged("a", Some(25.0), Some(27.5))], 5.0, 30);
        assert_eq!(t.cursor(), 30);
        assert_eq!(t.chunks()[0].start_s, 25);
    }

    #[test]
    fn start_never_after_end() {
        let t = to_transcript(&[merged("a", Some(2.5), Some(0.0))], 5.0, 0);
        assert_eq!(t.chunks()[0].start_s, 0);
        assert_eq!(t.chunks()[0].end_s, 0);
    }

    #[test]
    fn indices_follow_order() {
        let t = to_transcript(
            &[merged("a", Some(0.0), Some(1.0)), merged("b", Some(1.0), Some(2.0))],
            5.0,
            0,
        );
        let idx: Vec<u32> = t.chunks().iter().map(|c| c.index).collect();
        assert_eq!(idx, vec![0, 1]);
    }

    #[test]
    fn on_chunk_emits_result_with_cursor() {
        let v = vocab();
        let tokens = v.window(&[(0.0, Some(3.0), "one two")]);
        let (mut tr, mut rx) = tracker(v);

        tr.on_chunk(raw(tokens, 10.0)).unwrap();
        let msg = rx.try_recv().unwrap();
        assert_matches!(
            msg,
            WorkerMessage::Result { ref transcript, done: false, cursor: 3 }
                if transcript.text() == "one two"
        );
    }

    #[test]
    fn on_complete_emits_done_and_returns_transcript() {
        let v = vocab();
        let tokens = v.window(&[(0.0, Some(2.0), "three")]);
        let (mut tr, mut rx) = tracker(v);
        tr.on_chunk(raw(tokens, 10.0)).unwrap();
        let _ = rx.try_recv().unwrap();

        let final_transcript = tr.on_complete();
        assert_eq!(final_transcript.text(), "three");
        assert_matches!(rx.try_recv().unwrap(), WorkerMessage::Done { ref transcript } if transcript == &final_transcript);
    }

    #[test]
    fn failed_stitch_keeps_previous_state() {
        let v = vocab();
        let good = v.window(&[(0.0, Some(2.0), "one")]);
        let (mut tr, mut rx) = tracker(v);
        tr.on_chunk(raw(good, 10.0)).unwrap();
        let before = tr.transcript().clone();
        let _ = rx.try_recv().unwrap();

        let mut bad = raw(vec![], 10.0);
        bad.stride.chunk_len_s = f64::INFINITY;
        assert_matches!(tr.on_chunk(bad), Err(PipelineError::Stitch(_)));
        assert_eq!(tr.transcript(), &before);
        assert_eq!(tr.windows(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn restitch_is_stable_for_identical_history() {
        let v = vocab();
        let w1 = v.window(&[(0.0, Some(4.0), "one two")]);
        let (mut a, _rx_a) = tracker(v.clone());
        let (mut b, _rx_b) = tracker(v);
        a.on_chunk(raw(w1.clone(), 10.0)).unwrap();
        b.on_chunk(raw(w1, 10.0)).unwrap();
        assert_eq!(a.transcript(), b.transcript());
    }

    #[test]
    fn backwards_timestamps_in_one_window_keep_start_before_end() {
        let v = vocab();
        let tokens = vec![
            0,
            v.timestamp(2.5),
            0,
            v.timestamp(0.0),
            0,
            0,
            v.timestamp(2.52),
            v.eot(),
        ];
        let (mut tr, _rx) = tracker(v);
        tr.on_chunk(raw(tokens, 10.0)).unwrap();

        let t = tr.transcript();
        assert!(t.chunks().iter().all(|c| c.start_s <= c.end_s));
        assert!(t.is_monotonic());
    }

    fn window_chunks(seconds: usize) -> Vec<(ChunkStride, bool)> {
        plan_windows(seconds * 16_000, &WindowSpec::default(), 16_000)
            .into_iter()
            .map(|w| (w.stride, w.is_last))
            .collect()
    }

    fn feed(
        v: MockVocabulary,
        history: Vec<Vec<u32>>,
        seconds: usize,
    ) -> Vec<(u32, Transcript)> {
        let (mut tr, mut rx) = tracker(v);
        let mut emitted = Vec::new();
        for ((stride, is_last), tokens) in window_chunks(seconds).into_iter().zip(history) {
            if tr.on_chunk(RawChunk { tokens, stride, is_last }).is_err() {
                continue;
            }
            if let Ok(WorkerMessage::Result { transcript, cursor, .. }) = rx.try_recv() {
                emitted.push((cursor, transcript));
            }
        }
        emitted
    }

    #[test]
    fn cursor_holds_when_later_window_closes_segment_earlier() {
        // Window 1 opens a segment at 25.0 s whose close falls in the right
        // overlap; window 2 closes it at 27.5 s.
        let v = MockVocabulary::new(&["a", "b", "c", "d", "e"]);
        let history = vec![
            vec![v.timestamp(25.0), 0, v.timestamp(25.02)],
            vec![v.timestamp(0.0), v.timestamp(2.5), v.timestamp(2.52)],
        ];

        let cursors: Vec<u32> = feed(v, history, 56).into_iter().map(|(c, _)| c).collect();
        assert_eq!(cursors, vec![30, 30]);
    }

    proptest! {
        #[test]
        fn cursor_never_decreases(
            history in prop::collection::vec(prop::collection::vec(0u32..1_510, 0..10), 3)
        ) {
            let v = MockVocabulary::new(&["a", "b", "c", "d", "e"]);
            let mut last = 0;
            for (cursor, transcript) in feed(v, history, 56) {
                prop_assert!(cursor >= last, "cursor went {} -> {}", last, cursor);
                prop_assert_eq!(cursor, transcript.cursor());
                prop_assert!(transcript.is_monotonic());
                prop_assert!(transcript.chunks().iter().all(|c| c.start_s <= c.end_s));
                last = cursor;
            }
        }
    }
}
