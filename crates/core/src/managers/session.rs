use bytes::Bytes;
use probehub_shared::{DuplexSession, HubError, HubId, HubResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

enum Payload {
    Text(String),
    Binary(Bytes),
}

struct Outbound {
    payload: Payload,
    done: oneshot::Sender<HubResult<()>>,
}

/// Registry-side handle for one agent's duplex session.
///
/// All outbound traffic funnels through a single writer task consuming the
/// send queue, so concurrent administrative callers can never interleave
/// writes on the underlying transport. Reads never pass through the handle.
pub struct SessionHandle {
    session_id: HubId,
    agent_id: String,
    tx: mpsc::Sender<Outbound>,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Wrap a transport and start its writer task.
    pub fn spawn(
        agent_id: impl Into<String>,
        transport: Arc<dyn DuplexSession>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let agent_id = agent_id.into();
        let (tx, rx) = mpsc::channel::<Outbound>(queue_capacity);
        let shutdown = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));

        let handle = Arc::new(Self {
            session_id: HubId::new(),
            agent_id: agent_id.clone(),
            tx,
            shutdown: shutdown.clone(),
            closed: closed.clone(),
        });

        tokio::spawn(write_loop(agent_id, transport, rx, shutdown, closed));
        handle
    }

    /// Unique id of this session instance. A reconnect produces a new id, so
    /// a stale close can be told apart from the live session.
    #[must_use]
    pub fn session_id(&self) -> HubId {
        self.session_id
    }

    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn send_text(&self, text: String) -> HubResult<()> {
        self.send(Payload::Text(text)).await
    }

    pub async fn send_binary(&self, frame: Bytes) -> HubResult<()> {
        self.send(Payload::Binary(frame)).await
    }

    async fn send(&self, payload: Payload) -> HubResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::SessionClosed(self.agent_id.clone()));
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Outbound {
                payload,
                done: done_tx,
            })
            .await
            .map_err(|_| HubError::SessionClosed(self.agent_id.clone()))?;
        done_rx
            .await
            .map_err(|_| HubError::SessionClosed(self.agent_id.clone()))?
    }

    /// Signal the writer task to stop. Queued-but-unsent messages are failed
    /// with `SessionClosed`, then the transport is closed. Idempotent.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn write_loop(
    agent_id: String,
    transport: Arc<dyn DuplexSession>,
    mut rx: mpsc::Receiver<Outbound>,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.notified() => {
                debug!(agent_id = %agent_id, "session writer shutting down");
                break;
            }
            outbound = rx.recv() => {
                let Some(outbound) = outbound else { break };
                let result = match outbound.payload {
                    Payload::Text(text) => transport.send_text(text).await,
                    Payload::Binary(frame) => transport.send_binary(frame).await,
                };
                let failed = result.is_err();
                let _ = outbound.done.send(result);
                if failed {
                    warn!(agent_id = %agent_id, "session write failed, closing session");
                    break;
                }
            }
        }
    }

    // Fail fast for new senders, then release everything still queued.
    closed.store(true, Ordering::Release);
    rx.close();
    while let Ok(outbound) = rx.try_recv() {
        let _ = outbound
            .done
            .send(Err(HubError::SessionClosed(agent_id.clone())));
    }

    if let Err(e) = transport.close().await {
        warn!(agent_id = %agent_id, error = %e, "failed to close agent transport");
    }
}
