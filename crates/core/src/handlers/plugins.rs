use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{AppResult, AppState};

/// List registered plugins from the catalog.
///
/// **Route:** `GET /api/plugins`
///
/// # Response
/// **200 OK:** JSON array of `{ id, name, version, has_artifact }`.
/// Control-only plugins report `has_artifact: false` and cannot be pushed
/// to agents.
pub async fn get_plugins(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let plugins: Vec<serde_json::Value> = state
        .catalog
        .descriptors()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "name": d.name,
                "version": d.version,
                "has_artifact": d.artifact.is_some(),
            })
        })
        .collect();
    Ok(Json(serde_json::json!(plugins)))
}

/// Ship a plugin to an agent: load announcement plus the binary artifact in
/// one transfer frame.
///
/// **Route:** `POST /api/agents/:id/plugins/:plugin_id`
///
/// # Response
/// - **200 OK:** `{ "status": "success" }` once written to the session
/// - **404 Not Found:** unknown agent, unknown plugin, or a control-only
///   plugin with no artifact to ship
/// - **410 Gone:** the session closed before the frame could be written
pub async fn load_plugin(
    State(state): State<Arc<AppState>>,
    Path((agent_id, plugin_id)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    state.dispatcher.load_plugin(&agent_id, &plugin_id).await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// Tell an agent to unload a plugin.
///
/// **Route:** `DELETE /api/agents/:id/plugins/:plugin_id`
///
/// # Response
/// - **200 OK:** `{ "status": "success" }` once written to the session
/// - **404 Not Found:** unknown agent or plugin
/// - **410 Gone:** the session closed before the message could be written
pub async fn unload_plugin(
    State(state): State<Arc<AppState>>,
    Path((agent_id, plugin_id)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .dispatcher
        .unload_plugin(&agent_id, &plugin_id)
        .await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}
