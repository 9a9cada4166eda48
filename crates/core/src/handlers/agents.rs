use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{AppResult, AppState};

/// List all connected agents.
///
/// **Route:** `GET /api/agents`
///
/// # Response
/// **200 OK:** JSON array of agent metadata (id, name, runtime blob,
/// connection time).
pub async fn get_agents(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let agents = state.registry.list();
    Ok(Json(serde_json::json!(agents)))
}

/// Stored metadata for one agent.
///
/// **Route:** `GET /api/agents/:id`
///
/// # Response
/// - **200 OK:** the agent's `AgentInfo`
/// - **404 Not Found:** no live session for this id
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let info = state.dispatcher.agent_info(&agent_id)?;
    Ok(Json(serde_json::json!(info)))
}

/// Push a configuration update to an agent. The body is forwarded opaquely
/// as the payload of a control-only message.
///
/// **Route:** `PATCH /api/agents/:id/config`
///
/// # Response
/// - **200 OK:** `{ "status": "success" }` once written to the session
/// - **404 Not Found:** unknown agent
/// - **410 Gone:** the session closed before the message could be written
pub async fn update_agent_config(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    body: String,
) -> AppResult<Json<serde_json::Value>> {
    state.dispatcher.update_config(&agent_id, body).await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}
