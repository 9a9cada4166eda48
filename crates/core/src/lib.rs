pub mod config;
pub mod db;
pub mod dispatch;
pub mod frame;
pub mod handlers;
pub mod managers;
pub mod router;
pub mod test_utils;
pub mod ws;

use probehub_shared::HubError;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::dispatch::CommandDispatcher;
use crate::managers::{AgentRegistry, PluginCatalog};
use crate::router::TelemetryRouter;

pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub catalog: Arc<PluginCatalog>,
    pub router: Arc<TelemetryRouter>,
    pub dispatcher: CommandDispatcher,
    pub config: AppConfig,
    pub shutdown: Arc<Notify>,
}

pub enum AppError {
    Hub(HubError),
    Internal(anyhow::Error),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, err_type, message) = match self {
            AppError::Hub(e) => {
                let status = match &e {
                    HubError::AgentNotFound(_) | HubError::PluginNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    HubError::SessionClosed(_) => StatusCode::GONE,
                    HubError::MalformedFrame(_)
                    | HubError::TruncatedFrame { .. }
                    | HubError::TrailingData { .. }
                    | HubError::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
                    HubError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    HubError::ConfigError(_) | HubError::Internal(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, format!("{:?}", e), e.to_string())
            }
            AppError::Internal(e) => {
                // Log full error server-side only; return generic message to client
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError".to_string(),
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = axum::Json(serde_json::json!({
            "status": "error",
            "error": {
                "type": err_type,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        AppError::Hub(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Assemble the full application router (administrative API plus the agent
/// attach endpoint) over the given state.
pub fn app(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, patch, post};
    use tower_http::cors::CorsLayer;

    let api_routes = axum::Router::new()
        .route("/agents", get(handlers::get_agents))
        .route("/agents/:id", get(handlers::get_agent))
        .route("/agents/:id/config", patch(handlers::update_agent_config))
        .route(
            "/agents/:id/plugins/:plugin_id",
            post(handlers::load_plugin).delete(handlers::unload_plugin),
        )
        .route("/plugins", get(handlers::get_plugins))
        .route("/telemetry/:plugin_id", get(handlers::telemetry_stream))
        .route("/agent/attach", get(ws::agent_attach_handler));

    axum::Router::new()
        .nest("/api", api_routes)
        .with_state(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(state.config.cors_origins.clone())
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
}

/// Server entry point: opens the telemetry store, wires the components and
/// serves until shutdown.
pub async fn run_server(config: AppConfig, catalog: PluginCatalog) -> anyhow::Result<()> {
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;
    use tracing::info;

    info!("+---------------------------------------+");
    info!("|            probehub server            |");
    info!(
        "|             Version {:<10}        |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+---------------------------------------+");

    // Ensure parent directory of the DB file exists (for deployed layout).
    if let Some(path_str) = config.database_url.strip_prefix("sqlite:") {
        let db_path = std::path::Path::new(path_str);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && parent != std::path::Path::new(".") {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let opts = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(opts).await?;
    db::init_db(&pool).await?;

    let catalog = Arc::new(catalog);
    info!(plugins = catalog.len(), "🔌 plugin catalog loaded");

    let registry = Arc::new(AgentRegistry::new());
    let store = Arc::new(db::SqliteTelemetryStore::new(pool));
    let router = Arc::new(TelemetryRouter::new(
        catalog.clone(),
        store,
        config.subscriber_buffer,
    ));
    let dispatcher = CommandDispatcher::new(registry.clone(), catalog.clone());

    let shutdown = Arc::new(Notify::new());
    let state = Arc::new(AppState {
        registry,
        catalog,
        router,
        dispatcher,
        config: config.clone(),
        shutdown: shutdown.clone(),
    });

    let app = app(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.bind_address, config.port)).await?;
    info!(
        "🚀 probehub is listening on http://{}:{}",
        config.bind_address, config.port
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.notify_waiters();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            info!("🛑 Graceful shutdown signal received. Stopping server...");
        })
        .await?;
    Ok(())
}
