//! Worker: host message loop in front of the engine adapter.
//!
//! The host talks to the worker through two channels. [`HostMessage`]s go in,
//! [`WorkerEvent`]s (protocol messages tagged with their request id) come
//! out. A start request that arrives while another one is running is
//! answered with `Failed { reason: Busy }` right away; a cancel request stops
//! its run at the next window boundary.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use scribe_core::{HostMessage, RequestId, WorkerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::adapter::EngineAdapter;

/// Host side of a running worker.
pub struct WorkerHandle {
    inbox: mpsc::UnboundedSender<HostMessage>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Send a message to the worker.
    pub fn send(&self, message: HostMessage) -> Result<(), mpsc::error::SendError<HostMessage>> {
        self.inbox.send(message)
    }

    /// Clone of the inbound channel, for hosts that send from several tasks.
    pub fn sender(&self) -> mpsc::UnboundedSender<HostMessage> {
        self.inbox.clone()
    }

    /// Next outbound event. `None` once the worker has stopped and every
    /// event has been read.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Stop accepting messages, cancel running requests and wait for the
    /// message loop to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        drop(self.inbox);
        if let Err(e) = self.task.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
}

/// Request dispatcher owned by the message loop.
pub struct Worker {
    adapter: Arc<EngineAdapter>,
    outbox: mpsc::UnboundedSender<WorkerEvent>,
    active: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl Worker {
    /// Start a worker on the current runtime.
    pub fn spawn(adapter: Arc<EngineAdapter>) -> WorkerHandle {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker = Self {
            adapter,
            outbox: outbox_tx,
            active: Arc::new(Mutex::new(HashMap::new())),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(worker.run(inbox_rx));

        WorkerHandle {
            inbox: inbox_tx,
            events: outbox_rx,
            shutdown,
            task,
        }
    }

    async fn run(self, mut inbox: mpsc::UnboundedReceiver<HostMessage>) {
        info!("worker started");
        loop {
            let message = tokio::select! {
                () = self.shutdown.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            match message {
                HostMessage::StartTranscription {
                    request_id,
                    audio,
                    model_name,
                } => self.start(request_id, audio, model_name),
                HostMessage::Cancel { request_id } => self.cancel(&request_id),
            }
        }
        self.shutdown.cancel();
        info!("worker stopped");
    }

    #[instrument(skip(self, audio), fields(request = %request_id, samples = audio.len()))]
    fn start(&self, request_id: RequestId, audio: Vec<f32>, model: String) {
        let permit = match self.adapter.try_acquire() {
            Ok(permit) => permit,
            Err(e) => {
                warn!("rejecting request: busy");
                let _ = self.outbox.send(WorkerEvent {
                    request_id,
                    message: e.to_message(),
                });
                return;
            }
        };

        let cancel = self.shutdown.child_token();
        let _ = self
            .active
            .lock()
            .insert(request_id.clone(), cancel.clone());
        info!(model, "request accepted");

        // Tag each message with the request id on its way to the host. If
        // the host stops reading, the sink closes and the run stops too.
        let (sink, mut messages) = mpsc::unbounded_channel();
        let outbox = self.outbox.clone();
        let tag = request_id.clone();
        let _ = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                let event = WorkerEvent {
                    request_id: tag.clone(),
                    message,
                };
                if outbox.send(event).is_err() {
                    break;
                }
            }
        });

        let active = Arc::clone(&self.active);
        let _ = tokio::spawn(async move {
            let _ = permit.run(audio, &model, cancel, sink).await;
            let _ = active.lock().remove(&request_id);
            debug!(request = %request_id, "request finished");
        });
    }

    #[instrument(skip(self), fields(request = %request_id))]
    fn cancel(&self, request_id: &RequestId) {
        match self.active.lock().get(request_id) {
            Some(token) => {
                info!("cancel requested");
                token.cancel();
            }
            None => debug!("cancel for unknown or finished request"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
