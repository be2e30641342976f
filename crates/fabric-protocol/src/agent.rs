//! Agent directory types.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::enums::{AgentHealth, AgentLifecycleState};
use crate::ids::{AgentId, MachineId};

/// A distinct identity, typically an AI worker, registered with the
/// directory. Owned exclusively by the agent directory component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub machine_id: MachineId,
    pub roles: IndexSet<String>,
    pub capabilities: IndexSet<String>,
    pub last_seen: DateTime<Utc>,
    pub health: AgentHealth,
    pub lifecycle_state: AgentLifecycleState,
    /// Opaque handle the coordination bus uses to find this agent's inbox.
    pub inbox_ref: AgentId,
}

impl Agent {
    pub fn register(agent_id: AgentId, machine_id: MachineId, roles: IndexSet<String>, capabilities: IndexSet<String>) -> Self {
        let now = Utc::now();
        Agent {
            inbox_ref: agent_id.clone(),
            agent_id,
            machine_id,
            roles,
            capabilities,
            last_seen: now,
            health: AgentHealth::Healthy,
            lifecycle_state: AgentLifecycleState::Registered,
        }
    }

    /// Whether this agent's heartbeat is older than `ttl`, making it
    /// eligible for the expiry sweep.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_starts_in_registered_state_and_healthy() {
        let agent = Agent::register(
            AgentId::new_uuid(),
            MachineId::from_string("m1"),
            IndexSet::new(),
            IndexSet::new(),
        );
        assert_eq!(agent.lifecycle_state, AgentLifecycleState::Registered);
        assert_eq!(agent.health, AgentHealth::Healthy);
    }

    #[test]
    fn is_expired_respects_ttl() {
        let mut agent = Agent::register(
            AgentId::new_uuid(),
            MachineId::from_string("m1"),
            IndexSet::new(),
            IndexSet::new(),
        );
        agent.last_seen = Utc::now() - chrono::Duration::minutes(10);
        assert!(agent.is_expired(Utc::now(), chrono::Duration::minutes(5)));
        assert!(!agent.is_expired(Utc::now(), chrono::Duration::minutes(20)));
    }
}
