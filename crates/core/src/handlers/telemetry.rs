use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use probehub_shared::HubId;
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc, time::Duration};

use crate::router::TelemetryRouter;
use crate::AppState;

#[derive(Deserialize)]
pub struct TelemetryQuery {
    /// Session scope appended to the plugin id to form the routing key.
    /// Absent means the unscoped key.
    #[serde(default)]
    pub session: String,
}

/// Unsubscribes when the SSE stream is dropped (client disconnect).
struct SubscriptionGuard {
    router: Arc<TelemetryRouter>,
    routing_key: String,
    id: HubId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.router.unsubscribe(&self.routing_key, self.id);
    }
}

/// Live telemetry stream for one routing key.
///
/// **Route:** `GET /api/telemetry/:plugin_id?session=<session_id>`
///
/// # Response
/// Server-sent events: a `handshake` event, then one event per telemetry
/// envelope delivered on the key. Delivery is at-most-once; a lagging
/// client misses envelopes rather than stalling ingestion.
pub async fn telemetry_stream(
    State(state): State<Arc<AppState>>,
    Path(plugin_id): Path<String>,
    Query(query): Query<TelemetryQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let routing_key = format!("{}{}", plugin_id, query.session);
    let subscription = state.router.subscribe(&routing_key);
    let guard = SubscriptionGuard {
        router: state.router.clone(),
        routing_key,
        id: subscription.id,
    };
    let mut receiver = subscription.receiver;

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok(Event::default().event("handshake").data("subscribed"));
        while let Some(envelope) = receiver.recv().await {
            if let Ok(json) = serde_json::to_string(&*envelope) {
                yield Ok(Event::default().data(json));
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
