use async_trait::async_trait;
use probehub_shared::{HubError, HubResult, TelemetryEnvelope, TelemetryStore};
use sqlx::SqlitePool;
use tracing::info;

/// Create the telemetry table if missing.
pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS telemetry (
            routing_key     TEXT NOT NULL,
            correlation_id  TEXT NOT NULL,
            plugin_id       TEXT NOT NULL,
            session_id      TEXT NOT NULL,
            received_at     TEXT NOT NULL,
            payload         TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_telemetry_routing_key ON telemetry (routing_key)")
        .execute(pool)
        .await?;

    info!("telemetry store schema ready");
    Ok(())
}

/// Append-only telemetry store over SQLite, addressed by routing key.
pub struct SqliteTelemetryStore {
    pool: SqlitePool,
}

impl SqliteTelemetryStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn append(&self, routing_key: &str, envelope: &TelemetryEnvelope) -> HubResult<()> {
        let payload = serde_json::to_string(&envelope.payload)
            .map_err(|e| HubError::StoreUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO telemetry \
             (routing_key, correlation_id, plugin_id, session_id, received_at, payload) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(routing_key)
        .bind(envelope.correlation_id.to_string())
        .bind(&envelope.plugin_id)
        .bind(&envelope.session_id)
        .bind(envelope.received_at.to_rfc3339())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| HubError::StoreUnavailable(e.to_string()))?;

        Ok(())
    }
}
