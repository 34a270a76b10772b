//! Host/worker protocol tests.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use scribe_core::{FailureReason, HostMessage, RequestId, WindowSpec, WorkerEvent, WorkerMessage};
use scribe_engine::mock::{MockEngine, MockLoader, MockVocabulary};
use scribe_runtime::{EngineAdapter, Worker, WorkerHandle};

const MODEL: &str = "openai/whisper-tiny.en";

fn slow_worker() -> WorkerHandle {
    let engine = MockEngine::new(MODEL, MockVocabulary::new(&["hello"]))
        .with_delay(Duration::from_millis(30));
    let loader = Arc::new(MockLoader::new(Arc::new(engine)));
    Worker::spawn(Arc::new(EngineAdapter::new(loader, WindowSpec::default())))
}

fn start(id: &str, seconds: usize) -> HostMessage {
    HostMessage::StartTranscription {
        request_id: RequestId::from(id),
        audio: vec![0.0; seconds * 16_000],
        model_name: MODEL.into(),
    }
}

/// Read events until both requests have seen a terminal message.
async fn collect(handle: &mut WorkerHandle, ids: &[&str]) -> Vec<WorkerEvent> {
    let mut events = Vec::new();
    let mut open: Vec<&str> = ids.to_vec();
    while !open.is_empty() {
        let Some(event) = handle.recv().await else {
            break;
        };
        if event.message.is_terminal() {
            open.retain(|id| *id != event.request_id.as_str());
        }
        events.push(event);
    }
    events
}

fn for_request<'a>(events: &'a [WorkerEvent], id: &str) -> Vec<&'a WorkerMessage> {
    events
        .iter()
        .filter(|e| e.request_id.as_str() == id)
        .map(|e| &e.message)
        .collect()
}

#[tokio::test]
async fn second_start_while_running_is_busy() {
    let mut handle = slow_worker();
    handle.send(start("a", 65)).unwrap();
    handle.send(start("b", 1)).unwrap();

    let events = collect(&mut handle, &["a", "b"]).await;

    let b = for_request(&events, "b");
    assert_eq!(b.len(), 1);
    assert_matches!(b[0], WorkerMessage::Failed { reason: FailureReason::Busy, .. });

    let a = for_request(&events, "a");
    assert_eq!(a.iter().filter(|m| m.kind() == "result").count(), 3);
    assert_matches!(a.last(), Some(WorkerMessage::Done { .. }));

    handle.shutdown().await;
}

#[tokio::test]
async fn busy_event_wire_shape() {
    let mut handle = slow_worker();
    handle.send(start("a", 65)).unwrap();
    handle.send(start("b", 1)).unwrap();

    let events = collect(&mut handle, &["a", "b"]).await;
    let busy = events
        .iter()
        .find(|e| e.request_id.as_str() == "b")
        .unwrap();
    insta::assert_json_snapshot!(busy, @r#"
    {
      "requestId": "b",
      "type": "failed",
      "reason": "Busy",
      "message": "transcription already in progress"
    }
    "#);

    handle.shutdown().await;
}

#[tokio::test]
async fn next_request_after_done_is_accepted() {
    let mut handle = slow_worker();
    handle.send(start("a", 1)).unwrap();
    let _ = collect(&mut handle, &["a"]).await;

    handle.send(start("b", 1)).unwrap();
    let events = collect(&mut handle, &["b"]).await;
    let b = for_request(&events, "b");
    assert_eq!(b.first(), Some(&&WorkerMessage::Queued));
    assert_matches!(b.last(), Some(WorkerMessage::Done { .. }));

    handle.shutdown().await;
}

#[tokio::test]
async fn cancel_stops_request_with_cancelled() {
    let mut handle = slow_worker();
    handle.send(start("long", 300)).unwrap();

    let mut messages = Vec::new();
    while let Some(event) = handle.recv().await {
        if event.message.kind() == "result" && messages.iter().all(|m: &WorkerMessage| m.kind() != "result") {
            handle
                .send(HostMessage::Cancel {
                    request_id: RequestId::from("long"),
                })
                .unwrap();
        }
        let terminal = event.message.is_terminal();
        messages.push(event.message);
        if terminal {
            break;
        }
    }

    let results = messages.iter().filter(|m| m.kind() == "result").count();
    assert!(results < 12, "cancel ignored: {results} results");
    assert_matches!(
        messages.last(),
        Some(WorkerMessage::Failed { reason: FailureReason::Cancelled, .. })
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn message_order_is_protocol_order() {
    let mut handle = slow_worker();
    handle.send(start("a", 40)).unwrap();
    let events = collect(&mut handle, &["a"]).await;
    let kinds: Vec<&str> = for_request(&events, "a").iter().map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        vec!["queued", "loading_model", "model_ready", "result", "result", "done"]
    );
    handle.shutdown().await;
}
