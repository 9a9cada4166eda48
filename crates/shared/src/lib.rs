use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier used across the hub (correlation ids, session epochs,
/// subscriber handles).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HubId(Uuid);

impl std::fmt::Display for HubId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default generates a random UUID v4. Each default HubId is unique,
/// suitable for correlation ids and ephemeral identifiers.
impl Default for HubId {
    fn default() -> Self {
        Self::new()
    }
}

impl HubId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Error taxonomy for the control-plane core.
///
/// Lookup failures (`AgentNotFound`, `PluginNotFound`) are reported
/// synchronously to the administrative caller and change no state. Decode
/// failures are local to the offending message: it is discarded, the session
/// stays open. `StoreUnavailable` is logged and never rolls back deliveries.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "detail")]
pub enum HubError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Truncated frame: declared {declared} bytes, got {actual}")]
    TruncatedFrame { declared: usize, actual: usize },
    #[error("Trailing data: declared {declared} bytes, got {actual}")]
    TrailingData { declared: usize, actual: usize },
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("Session closed: {0}")]
    SessionClosed(String),
    #[error("Telemetry store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HubResult<T> = std::result::Result<T, HubError>;

/// Last-known descriptive metadata for a connected agent. The `runtime`
/// blob (JVM vendor, version, pid and the like) is opaque to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub runtime: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub connected_at: DateTime<Utc>,
}

/// Control message kinds understood by the agent side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Message,
}

/// Outbound control message sent to an agent, either as a bare text send or
/// as the control slot of a transfer frame.
///
/// `destination` is a path-style topic the agent dispatches on
/// (`/plugins/load`, `/plugins/unload`, `/agent/update-config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub kind: MessageKind,
    pub destination: String,
    pub payload: String,
}

impl ControlMessage {
    pub fn new(destination: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Message,
            destination: destination.into(),
            payload: payload.into(),
        }
    }
}

/// Telemetry message as it arrives on the wire from an agent. The envelope
/// proper (correlation id, arrival timestamp) is assigned by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub plugin_id: String,
    /// Empty string means "no session scope".
    #[serde(default)]
    pub session_id: String,
    pub payload: serde_json::Value,
}

/// A telemetry envelope after arrival: routed, fanned out, and persisted,
/// then discarded by the router (durability passes to the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    pub correlation_id: HubId,
    pub plugin_id: String,
    pub session_id: String,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl TelemetryEnvelope {
    pub fn from_message(msg: TelemetryMessage) -> Self {
        Self {
            correlation_id: HubId::new(),
            plugin_id: msg.plugin_id,
            session_id: msg.session_id,
            received_at: Utc::now(),
            payload: msg.payload,
        }
    }

    /// Routing key = plugin identifier + session identifier. Collisions
    /// across plugin/session pairs are intentional: the key scopes
    /// subscriptions and persistence.
    #[must_use]
    pub fn routing_key(&self) -> String {
        format!("{}{}", self.plugin_id, self.session_id)
    }
}

/// Server-side control capability of a plugin, resolved via the catalog.
/// Invoked for plugin-specific logic outside the transport core.
#[async_trait]
pub trait PluginControl: Send + Sync {
    fn plugin_id(&self) -> &str;

    /// Hook invoked for each telemetry envelope addressed to this plugin.
    /// Failures are logged by the router and never fail ingestion.
    async fn on_telemetry(&self, _envelope: &TelemetryEnvelope) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Descriptor of a distributable plugin. `artifact` is the agent-side binary
/// payload; control-only plugins carry `None` and cannot be pushed to agents.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub artifact: Option<Bytes>,
    pub control: Arc<dyn PluginControl>,
}

/// Bidirectional, message-oriented connection to one agent, provided by an
/// external transport layer. Implementations must tolerate `close` being
/// called more than once.
#[async_trait]
pub trait DuplexSession: Send + Sync {
    async fn send_text(&self, text: String) -> HubResult<()>;
    async fn send_binary(&self, frame: Bytes) -> HubResult<()>;
    async fn close(&self) -> HubResult<()>;
}

/// Opaque append-only telemetry store addressed by routing key.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn append(&self, routing_key: &str, envelope: &TelemetryEnvelope) -> HubResult<()>;
}
