use dashmap::DashMap;
use probehub_shared::{HubError, HubId, HubResult, TelemetryEnvelope, TelemetryMessage, TelemetryStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::managers::PluginCatalog;

/// A live subscription on one routing key. Dropping the receiver is enough;
/// the router prunes closed subscribers on the next delivery.
pub struct TelemetrySubscription {
    pub id: HubId,
    pub receiver: mpsc::Receiver<Arc<TelemetryEnvelope>>,
}

struct Subscriber {
    id: HubId,
    tx: mpsc::Sender<Arc<TelemetryEnvelope>>,
}

/// Receives raw telemetry from agent sessions, resolves the routing key and
/// fans each envelope out to live subscribers while recording it durably.
///
/// Delivery and persistence are independent best-effort actions: a failure
/// in either is logged and never fails ingestion or the other action.
/// Per-agent ordering holds because each agent's reader loop calls `ingest`
/// sequentially and fan-out happens inline.
pub struct TelemetryRouter {
    subscribers: DashMap<String, Vec<Subscriber>>,
    catalog: Arc<PluginCatalog>,
    store: Arc<dyn TelemetryStore>,
    subscriber_buffer: usize,
}

impl TelemetryRouter {
    #[must_use]
    pub fn new(
        catalog: Arc<PluginCatalog>,
        store: Arc<dyn TelemetryStore>,
        subscriber_buffer: usize,
    ) -> Self {
        Self {
            subscribers: DashMap::new(),
            catalog,
            store,
            subscriber_buffer,
        }
    }

    /// Ingest one raw telemetry message from an agent session.
    ///
    /// A parse failure returns `MalformedEnvelope`: the message is dropped,
    /// not retried, and the caller keeps the session open. On success the
    /// envelope gets a fresh correlation id and arrival timestamp, the
    /// plugin's server-side hook runs, subscribers on the routing key get a
    /// copy, and the envelope is appended to the store.
    pub async fn ingest(&self, agent_id: &str, raw: &[u8]) -> HubResult<()> {
        let message: TelemetryMessage = serde_json::from_slice(raw).map_err(|e| {
            warn!(agent_id = %agent_id, error = %e, "dropping malformed telemetry message");
            HubError::MalformedEnvelope(e.to_string())
        })?;

        let envelope = Arc::new(TelemetryEnvelope::from_message(message));
        let routing_key = envelope.routing_key();
        debug!(
            agent_id = %agent_id,
            routing_key = %routing_key,
            correlation_id = %envelope.correlation_id,
            "telemetry received"
        );

        // Server-side plugin hook, best-effort.
        if let Some(descriptor) = self.catalog.get(&envelope.plugin_id) {
            if let Err(e) = descriptor.control.on_telemetry(&envelope).await {
                error!(
                    plugin_id = %envelope.plugin_id,
                    error = %e,
                    "🔌 plugin control hook failed"
                );
            }
        }

        self.deliver(&routing_key, &envelope);

        if let Err(e) = self.store.append(&routing_key, &envelope).await {
            error!(routing_key = %routing_key, error = %e, "failed to persist telemetry");
        }

        Ok(())
    }

    /// Fan the envelope out to every live subscriber on the key. One
    /// subscriber's failure never blocks the others; closed receivers are
    /// pruned, lagging ones drop this envelope (at-most-once delivery).
    fn deliver(&self, routing_key: &str, envelope: &Arc<TelemetryEnvelope>) {
        let Some(mut subscribers) = self.subscribers.get_mut(routing_key) else {
            return;
        };
        subscribers.retain(|subscriber| match subscriber.tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    routing_key = %routing_key,
                    subscriber = %subscriber.id,
                    "subscriber lagging, dropping envelope"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %subscriber.id, "pruning closed subscriber");
                false
            }
        });
    }

    /// Register a live subscriber on a routing key.
    #[must_use]
    pub fn subscribe(&self, routing_key: &str) -> TelemetrySubscription {
        let (tx, receiver) = mpsc::channel(self.subscriber_buffer);
        let id = HubId::new();
        self.subscribers
            .entry(routing_key.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        TelemetrySubscription { id, receiver }
    }

    pub fn unsubscribe(&self, routing_key: &str, id: HubId) {
        if let Some(mut subscribers) = self.subscribers.get_mut(routing_key) {
            subscribers.retain(|s| s.id != id);
        }
        self.subscribers.remove_if(routing_key, |_, v| v.is_empty());
    }

    #[must_use]
    pub fn subscriber_count(&self, routing_key: &str) -> usize {
        self.subscribers
            .get(routing_key)
            .map_or(0, |subscribers| subscribers.len())
    }
}
