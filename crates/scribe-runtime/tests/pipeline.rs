//! End-to-end pipeline tests against the scripted engine.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::StreamExt;
use scribe_core::{FailureReason, WindowSpec, WorkerMessage};
use scribe_engine::mock::{FailingLoader, MockEngine, MockLoader, MockVocabulary};
use scribe_runtime::{EngineAdapter, PipelineError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MODEL: &str = "openai/whisper-tiny.en";
const SR: usize = 16_000;

const WORDS: &[&str] = &[
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "and", "runs",
];

/// Scripted engine for 65 s of audio: windows [0, 30), [25, 55), [50, 65).
fn three_window_engine() -> MockEngine {
    let v = MockVocabulary::new(WORDS);
    let script = vec![
        v.window(&[(0.0, Some(10.0), "the quick brown"), (10.0, Some(29.0), "fox jumps")]),
        v.window(&[(4.0, Some(10.0), "fox jumps over"), (10.0, Some(14.0), "lazy dog")]),
        v.window(&[(3.0, Some(8.0), "and runs")]),
    ];
    MockEngine::new(MODEL, v).with_script(script)
}

fn adapter_for(engine: Arc<MockEngine>) -> (Arc<EngineAdapter>, Arc<MockLoader>) {
    let loader = Arc::new(MockLoader::new(engine).with_file("onnx/decoder_model.onnx", 2_000));
    let adapter = Arc::new(EngineAdapter::new(loader.clone(), WindowSpec::default()));
    (adapter, loader)
}

async fn run(
    adapter: &Arc<EngineAdapter>,
    audio: Vec<f32>,
) -> (Result<scribe_core::Transcript, PipelineError>, Vec<WorkerMessage>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = adapter
        .transcribe(audio, MODEL, CancellationToken::new(), tx)
        .await;
    let mut messages = Vec::new();
    while let Some(m) = rx.recv().await {
        messages.push(m);
    }
    (result, messages)
}

fn kinds(messages: &[WorkerMessage]) -> Vec<&'static str> {
    messages.iter().map(WorkerMessage::kind).collect()
}

#[tokio::test]
async fn sixty_five_seconds_yields_three_results_then_done() {
    let engine = Arc::new(three_window_engine());
    let (adapter, _) = adapter_for(engine.clone());

    let (result, messages) = run(&adapter, vec![0.0; 65 * SR]).await;
    let transcript = result.unwrap();

    assert_eq!(
        kinds(&messages),
        vec![
            "queued",
            "loading_model",
            "downloading",
            "downloading",
            "model_ready",
            "result",
            "result",
            "result",
            "done",
        ]
    );
    assert_eq!(engine.windows_seen(), vec![30 * SR, 30 * SR, 15 * SR]);

    let cursors: Vec<u32> = messages
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Result { cursor, done, .. } => {
                assert!(!done);
                Some(*cursor)
            }
            _ => None,
        })
        .collect();
    assert_eq!(cursors, vec![15, 40, 58]);

    assert_eq!(
        transcript.text(),
        "the quick brown fox jumps over lazy dog and runs"
    );
    let bounds: Vec<(u32, u32)> = transcript.chunks().iter().map(|c| (c.start_s, c.end_s)).collect();
    assert_eq!(bounds, vec![(0, 10), (10, 35), (35, 58)]);
    assert!(transcript.is_monotonic());
    assert_matches!(messages.last(), Some(WorkerMessage::Done { transcript: t }) if t == &transcript);
}

#[tokio::test]
async fn later_window_revises_open_segment() {
    let engine = Arc::new(three_window_engine());
    let (adapter, _) = adapter_for(engine);
    let (_, messages) = run(&adapter, vec![0.0; 65 * SR]).await;

    let snapshots: Vec<&scribe_core::Transcript> = messages
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Result { transcript, .. } => Some(transcript),
            _ => None,
        })
        .collect();
    // "fox jumps" is open after the first window and closed by the second.
    assert_eq!(snapshots[0].chunks()[1].text, "fox jumps");
    assert_eq!(snapshots[1].chunks()[1].text, "fox jumps over");
}

#[tokio::test]
async fn downloads_are_reported_only_on_first_call() {
    let engine = Arc::new(MockEngine::new(MODEL, MockVocabulary::new(WORDS)));
    let (adapter, loader) = adapter_for(engine);

    let (_, first) = run(&adapter, vec![0.0; SR]).await;
    let (_, second) = run(&adapter, vec![0.0; SR]).await;

    assert!(kinds(&first).contains(&"downloading"));
    assert_eq!(
        kinds(&second),
        vec!["queued", "loading_model", "model_ready", "result", "done"]
    );
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn downloading_messages_carry_percentages() {
    let engine = Arc::new(MockEngine::new(MODEL, MockVocabulary::new(WORDS)));
    let (adapter, _) = adapter_for(engine);
    let (_, messages) = run(&adapter, vec![0.0; SR]).await;

    let progress: Vec<f64> = messages
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Downloading { file, progress, total, .. } => {
                assert_eq!(file, "onnx/decoder_model.onnx");
                assert_eq!(*total, 2_000);
                Some(*progress)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![50.0, 100.0]);
}

#[tokio::test]
async fn load_failure_emits_single_failed() {
    let adapter = Arc::new(EngineAdapter::new(
        Arc::new(FailingLoader::new("network unreachable")),
        WindowSpec::default(),
    ));
    let (result, messages) = run(&adapter, vec![0.0; SR]).await;

    assert_matches!(result, Err(PipelineError::Engine(_)));
    assert_eq!(kinds(&messages), vec!["queued", "loading_model", "failed"]);
    assert_matches!(
        messages.last(),
        Some(WorkerMessage::Failed { reason: FailureReason::EngineUnavailable, message })
            if message.contains("network unreachable")
    );
    assert!(!adapter.is_busy());
}

#[tokio::test]
async fn window_failure_stops_the_call() {
    let engine = MockEngine::new(MODEL, MockVocabulary::new(WORDS));
    engine.push_failure("onnx runtime error");
    let (adapter, _) = adapter_for(Arc::new(engine));

    let (result, messages) = run(&adapter, vec![0.0; 65 * SR]).await;
    assert_matches!(result, Err(PipelineError::Engine(_)));
    assert_eq!(
        messages.iter().filter(|m| m.kind() == "result").count(),
        0
    );
    assert_matches!(
        messages.last(),
        Some(WorkerMessage::Failed { reason: FailureReason::EngineUnavailable, .. })
    );
}

#[tokio::test]
async fn model_mismatch_is_engine_unavailable() {
    let engine = Arc::new(MockEngine::new(MODEL, MockVocabulary::new(WORDS)));
    let (adapter, _) = adapter_for(engine);
    let _ = run(&adapter, vec![0.0; SR]).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = adapter
        .transcribe(vec![0.0; SR], "openai/whisper-base", CancellationToken::new(), tx)
        .await;
    assert_matches!(result, Err(PipelineError::Engine(_)));

    let mut last = None;
    while let Some(m) = rx.recv().await {
        last = Some(m);
    }
    assert_matches!(
        last,
        Some(WorkerMessage::Failed { reason: FailureReason::EngineUnavailable, .. })
    );
}

#[tokio::test]
async fn non_finite_audio_is_invalid() {
    let engine = Arc::new(MockEngine::new(MODEL, MockVocabulary::new(WORDS)));
    let (adapter, loader) = adapter_for(engine);
    let mut audio = vec![0.0; SR];
    audio[100] = f32::INFINITY;

    let (result, messages) = run(&adapter, audio).await;
    assert_matches!(result, Err(PipelineError::InvalidAudio(_)));
    assert_eq!(kinds(&messages), vec!["queued", "failed"]);
    assert_eq!(loader.load_count(), 0);
}

#[tokio::test]
async fn concurrent_call_is_rejected_as_busy() {
    let engine = MockEngine::new(MODEL, MockVocabulary::new(WORDS)).with_delay(Duration::from_millis(40));
    let (adapter, _) = adapter_for(Arc::new(engine));

    let first = {
        let adapter = Arc::clone(&adapter);
        tokio::spawn(async move { run(&adapter, vec![0.0; 65 * SR]).await })
    };
    while !adapter.is_busy() {
        tokio::task::yield_now().await;
    }

    let (second, messages) = run(&adapter, vec![0.0; SR]).await;
    assert_matches!(second, Err(PipelineError::Busy));
    assert_eq!(kinds(&messages), vec!["failed"]);

    let (first, first_messages) = first.await.unwrap();
    assert!(first.is_ok());
    assert_eq!(first_messages.last().map(WorkerMessage::kind), Some("done"));
    assert!(!adapter.is_busy());
}

#[tokio::test]
async fn cancellation_stops_between_windows() {
    let engine = Arc::new(
        MockEngine::new(MODEL, MockVocabulary::new(WORDS)).with_delay(Duration::from_millis(20)),
    );
    let (adapter, _) = adapter_for(engine.clone());
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = {
        let adapter = Arc::clone(&adapter);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            adapter
                .transcribe(vec![0.0; 300 * SR], MODEL, cancel, tx)
                .await
        })
    };

    let mut messages = Vec::new();
    while let Some(m) = rx.recv().await {
        if m.kind() == "result" && !cancel.is_cancelled() {
            cancel.cancel();
        }
        messages.push(m);
    }

    assert_matches!(task.await.unwrap(), Err(PipelineError::Cancelled));
    assert_matches!(
        messages.last(),
        Some(WorkerMessage::Failed { reason: FailureReason::Cancelled, .. })
    );
    assert!(engine.windows_seen().len() < 12);
    assert!(!adapter.is_busy());
}

#[tokio::test]
async fn stream_delivers_full_sequence() {
    let engine = Arc::new(three_window_engine());
    let (adapter, _) = adapter_for(engine);

    let messages: Vec<WorkerMessage> = adapter.stream(vec![0.0; 65 * SR], MODEL).collect().await;
    assert_eq!(messages.first(), Some(&WorkerMessage::Queued));
    assert_eq!(messages.iter().filter(|m| m.kind() == "result").count(), 3);
    assert_eq!(messages.iter().filter(|m| m.is_terminal()).count(), 1);
    assert_eq!(messages.last().map(WorkerMessage::kind), Some("done"));
}

#[tokio::test]
async fn dropping_stream_stops_the_call() {
    let engine = Arc::new(
        MockEngine::new(MODEL, MockVocabulary::new(WORDS)).with_delay(Duration::from_millis(20)),
    );
    let (adapter, _) = adapter_for(engine.clone());

    let mut stream = adapter.stream(vec![0.0; 300 * SR], MODEL);
    while let Some(m) = stream.next().await {
        if m.kind() == "result" {
            break;
        }
    }
    drop(stream);

    while adapter.is_busy() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(engine.windows_seen().len() < 12);
}
