use dashmap::DashMap;
use probehub_shared::{AgentInfo, HubId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::session::SessionHandle;

struct AgentEntry {
    info: AgentInfo,
    session: Arc<SessionHandle>,
}

/// Tracks connected agents and their live session handle. The sole owner of
/// the agent-id → session mapping; sessions are never handed out for
/// anything but writes.
///
/// Invariant: at most one live session per agent identifier. A new
/// connection for the same id supersedes the old one, which is closed.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, AgentEntry>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the live session for an agent. Idempotent; a
    /// superseded session is closed (close failure is logged by the session
    /// writer, never fatal). The per-key map lock serializes concurrent
    /// registrations for the same id.
    pub fn register(&self, info: AgentInfo, session: Arc<SessionHandle>) {
        let agent_id = info.id.clone();
        info!(agent_id = %agent_id, name = %info.name, "agent attached");
        if let Some(previous) = self.agents.insert(agent_id.clone(), AgentEntry { info, session })
        {
            warn!(agent_id = %agent_id, "superseding live session for reconnecting agent");
            previous.session.close();
        }
    }

    /// Current session for an agent, if connected. Never blocks.
    #[must_use]
    pub fn lookup(&self, agent_id: &str) -> Option<Arc<SessionHandle>> {
        self.agents.get(agent_id).map(|e| e.session.clone())
    }

    /// Last-known metadata for an agent.
    #[must_use]
    pub fn info(&self, agent_id: &str) -> Option<AgentInfo> {
        self.agents.get(agent_id).map(|e| e.info.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents.iter().map(|e| e.info.clone()).collect()
    }

    /// Remove the entry for an agent, but only if it still holds the given
    /// session. A close racing a reconnect must not evict the fresh session.
    pub fn unregister(&self, agent_id: &str, session_id: HubId) {
        let removed = self
            .agents
            .remove_if(agent_id, |_, entry| entry.session.session_id() == session_id);
        if let Some((_, entry)) = removed {
            debug!(agent_id = %agent_id, "agent detached");
            entry.session.close();
        }
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.agents.len()
    }
}
