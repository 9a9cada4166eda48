use probehub_shared::{AgentInfo, ControlMessage, HubError, HubResult};
use std::sync::Arc;
use tracing::info;

use crate::frame::FrameCodec;
use crate::managers::{AgentRegistry, PluginCatalog, SessionHandle};

/// Agent-side dispatch topics, mirrored by the agent runtime.
pub const TOPIC_UPDATE_CONFIG: &str = "/agent/update-config";
pub const TOPIC_LOAD_PLUGIN: &str = "/plugins/load";
pub const TOPIC_UNLOAD_PLUGIN: &str = "/plugins/unload";

/// Turns administrative intents into outbound messages or binary frames on
/// the target agent's session.
///
/// Every operation reads through the registry and catalog at call time, so
/// attach/detach are immediately visible. "Written to the session" is the
/// terminal success state; agent-side processing is outside this core.
pub struct CommandDispatcher {
    registry: Arc<AgentRegistry>,
    catalog: Arc<PluginCatalog>,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, catalog: Arc<PluginCatalog>) -> Self {
        Self { registry, catalog }
    }

    fn resolve_agent(&self, agent_id: &str) -> HubResult<Arc<SessionHandle>> {
        self.registry
            .lookup(agent_id)
            .ok_or_else(|| HubError::AgentNotFound(agent_id.to_string()))
    }

    /// Push a configuration update to an agent as a control-only message.
    pub async fn update_config(&self, agent_id: &str, config: String) -> HubResult<()> {
        let session = self.resolve_agent(agent_id)?;
        let message = ControlMessage::new(TOPIC_UPDATE_CONFIG, config);
        session.send_text(encode_text(&message)?).await?;
        info!(agent_id = %agent_id, "config update sent");
        Ok(())
    }

    /// Tell an agent to unload a plugin. The plugin must exist in the
    /// catalog even for the unload path, so a typo cannot reach the agent.
    pub async fn unload_plugin(&self, agent_id: &str, plugin_id: &str) -> HubResult<()> {
        let session = self.resolve_agent(agent_id)?;
        let descriptor = self
            .catalog
            .get(plugin_id)
            .ok_or_else(|| HubError::PluginNotFound(plugin_id.to_string()))?;

        let message = ControlMessage::new(TOPIC_UNLOAD_PLUGIN, descriptor.id.clone());
        session.send_text(encode_text(&message)?).await?;
        info!(agent_id = %agent_id, plugin_id = %plugin_id, "plugin unload sent");
        Ok(())
    }

    /// Ship a plugin to an agent: the load announcement and the full binary
    /// artifact travel together in one transfer frame, one binary send.
    /// A catalog entry without an artifact has nothing to ship and is
    /// treated as `PluginNotFound`.
    pub async fn load_plugin(&self, agent_id: &str, plugin_id: &str) -> HubResult<()> {
        let session = self.resolve_agent(agent_id)?;
        let descriptor = self
            .catalog
            .get(plugin_id)
            .ok_or_else(|| HubError::PluginNotFound(plugin_id.to_string()))?;
        let artifact = descriptor
            .artifact
            .as_ref()
            .ok_or_else(|| HubError::PluginNotFound(plugin_id.to_string()))?;

        let message = ControlMessage::new(TOPIC_LOAD_PLUGIN, descriptor.id.clone());
        let control = encode_text(&message)?;
        let frame = FrameCodec::encode(control.as_bytes(), artifact)?;

        session.send_binary(frame).await?;
        info!(
            agent_id = %agent_id,
            plugin_id = %plugin_id,
            artifact_bytes = artifact.len(),
            "📦 plugin artifact sent"
        );
        Ok(())
    }

    /// Stored metadata for a connected agent.
    pub fn agent_info(&self, agent_id: &str) -> HubResult<AgentInfo> {
        self.registry
            .info(agent_id)
            .ok_or_else(|| HubError::AgentNotFound(agent_id.to_string()))
    }
}

fn encode_text(message: &ControlMessage) -> HubResult<String> {
    serde_json::to_string(message).map_err(|e| HubError::Internal(e.to_string()))
}
