use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use probehub_shared::{AgentInfo, DuplexSession, HubError, HubResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::managers::SessionHandle;
use crate::AppState;

/// Agent attach endpoint.
///
/// **Route:** `GET /api/agent/attach` (WebSocket upgrade)
///
/// The first text message must be an attach announcement
/// `{ "id": ..., "name": ..., "runtime": ... }`. After registration every
/// text message is fed to the telemetry router; a malformed message is
/// dropped and the session stays open. Socket close or error unregisters
/// the agent, scoped to this session so a racing reconnect survives.
pub async fn agent_attach_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent_socket(state, socket))
}

async fn handle_agent_socket(state: Arc<AppState>, socket: WebSocket) {
    let (sink, mut stream) = socket.split();

    let Some(info) = read_announcement(&mut stream).await else {
        return;
    };
    let agent_id = info.id.clone();

    let transport = Arc::new(WsTransport::new(sink));
    let session = SessionHandle::spawn(&agent_id, transport, state.config.session_send_queue);
    let session_id = session.session_id();
    state.registry.register(info, session);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                // Decode failures are local to the message; the router
                // already logged the reason.
                let _ = state.router.ingest(&agent_id, text.as_bytes()).await;
            }
            Ok(Message::Binary(raw)) => {
                let _ = state.router.ingest(&agent_id, &raw).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "agent socket error");
                break;
            }
        }
    }

    info!(agent_id = %agent_id, "agent socket closed");
    state.registry.unregister(&agent_id, session_id);
}

/// Reads the attach announcement, skipping protocol ping/pong frames that may
/// arrive first. Anything else before the announcement rejects the agent.
async fn read_announcement<S>(stream: &mut S) -> Option<AgentInfo>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                return match serde_json::from_str::<AgentInfo>(&text) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warn!(error = %e, "rejecting agent with malformed attach announcement");
                        None
                    }
                }
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            _ => break,
        }
    }
    warn!("agent sent no attach announcement");
    None
}

/// Duplex session over an axum WebSocket write half. The mutex only guards
/// against the split sink itself; serialization of writers happens upstream
/// in the session writer task.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsTransport {
    #[must_use]
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl DuplexSession for WsTransport {
    async fn send_text(&self, text: String) -> HubResult<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| HubError::SessionClosed(e.to_string()))
    }

    async fn send_binary(&self, frame: Bytes) -> HubResult<()> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| HubError::SessionClosed(e.to_string()))
    }

    async fn close(&self) -> HubResult<()> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| HubError::SessionClosed(e.to_string()))
    }
}
