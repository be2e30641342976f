//! Registry of live agents: capabilities, health, TTL-driven lifecycle.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use fabric_protocol::{Agent, AgentHealth, AgentId, AgentLifecycleState, FabricError, FabricResult, MachineId};
use indexmap::IndexSet;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Consumed by the coordination bus to re-evaluate pending delegations and
/// route around agents that just went offline.
#[derive(Debug, Clone)]
pub struct LifecycleTransition {
    pub agent_id: AgentId,
    pub from: AgentLifecycleState,
    pub to: AgentLifecycleState,
}

#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub role: Option<String>,
    pub capability: Option<String>,
    pub lifecycle_state: Option<AgentLifecycleState>,
}

pub struct AgentDirectory {
    agents: DashMap<AgentId, Agent>,
    transitions: broadcast::Sender<LifecycleTransition>,
    /// Default 120s, per the directory's expiry contract.
    ttl: Duration,
}

impl AgentDirectory {
    pub fn new(ttl: Duration) -> Self {
        let (transitions, _) = broadcast::channel(256);
        AgentDirectory { agents: DashMap::new(), transitions, ttl }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.transitions.subscribe()
    }

    #[instrument(skip(self, roles, capabilities), fields(agent_id = %agent_id))]
    pub fn register(&self, agent_id: AgentId, machine_id: MachineId, roles: IndexSet<String>, capabilities: IndexSet<String>) {
        match self.agents.get_mut(&agent_id) {
            Some(mut existing) => {
                existing.machine_id = machine_id;
                existing.roles = roles;
                existing.capabilities = capabilities;
                existing.last_seen = Utc::now();
            }
            None => {
                let agent = Agent::register(agent_id.clone(), machine_id, roles, capabilities);
                self.emit(&agent_id, AgentLifecycleState::Unknown, agent.lifecycle_state);
                self.agents.insert(agent_id, agent);
            }
        }
    }

    #[instrument(skip(self), fields(agent_id = %agent_id))]
    pub fn heartbeat(&self, agent_id: &AgentId, health: AgentHealth) -> FabricResult<()> {
        let mut agent = self.agents.get_mut(agent_id).ok_or_else(|| FabricError::NotFound(agent_id.to_string()))?;
        agent.last_seen = Utc::now();
        agent.health = health;
        let from = agent.lifecycle_state;
        if matches!(from, AgentLifecycleState::Registered | AgentLifecycleState::Idle | AgentLifecycleState::Offline) {
            agent.lifecycle_state = AgentLifecycleState::Active;
        }
        let to = agent.lifecycle_state;
        drop(agent);
        if from != to {
            self.emit(agent_id, from, to);
        }
        Ok(())
    }

    pub fn list(&self, filter: AgentFilter) -> Vec<Agent> {
        self.agents
            .iter()
            .map(|r| r.value().clone())
            .filter(|a| filter.role.as_ref().map(|r| a.roles.contains(r)).unwrap_or(true))
            .filter(|a| filter.capability.as_ref().map(|c| a.capabilities.contains(c)).unwrap_or(true))
            .filter(|a| filter.lifecycle_state.map(|s| a.lifecycle_state == s).unwrap_or(true))
            .collect()
    }

    pub fn status(&self, agent_id: &AgentId) -> FabricResult<Agent> {
        self.agents.get(agent_id).map(|r| r.value().clone()).ok_or_else(|| FabricError::NotFound(agent_id.to_string()))
    }

    /// `registered -> active -> idle (no heartbeat > TTL/2) -> offline (no
    /// heartbeat > TTL) -> purged (no heartbeat > retention horizon)`.
    #[instrument(skip(self))]
    pub fn expire_sweep(&self, now: DateTime<Utc>, retention_horizon: Duration) -> u64 {
        let mut transitioned = 0u64;
        let mut purge_list = Vec::new();

        for mut entry in self.agents.iter_mut() {
            let agent = entry.value_mut();
            let since_heartbeat = now.signed_duration_since(agent.last_seen);
            let from = agent.lifecycle_state;
            let next = if since_heartbeat > retention_horizon {
                AgentLifecycleState::Purged
            } else if since_heartbeat > self.ttl {
                AgentLifecycleState::Offline
            } else if since_heartbeat > self.ttl / 2 {
                AgentLifecycleState::Idle
            } else {
                from
            };
            if next != from && from.can_transition_to(next) {
                agent.lifecycle_state = next;
                transitioned += 1;
                if next == AgentLifecycleState::Purged {
                    purge_list.push(agent.agent_id.clone());
                }
                self.emit(&agent.agent_id, from, next);
            }
        }

        for agent_id in purge_list {
            self.agents.remove(&agent_id);
        }
        if transitioned > 0 {
            info!(transitioned, "agent directory expiry sweep applied transitions");
        }
        transitioned
    }

    fn emit(&self, agent_id: &AgentId, from: AgentLifecycleState, to: AgentLifecycleState) {
        let _ = self.transitions.send(LifecycleTransition { agent_id: agent_id.clone(), from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_heartbeat_moves_to_active() {
        let directory = AgentDirectory::new(Duration::seconds(120));
        directory.register(AgentId::from_string("a1"), MachineId::from_string("m1"), IndexSet::new(), IndexSet::new());
        directory.heartbeat(&AgentId::from_string("a1"), AgentHealth::Healthy).unwrap();
        let agent = directory.status(&AgentId::from_string("a1")).unwrap();
        assert_eq!(agent.lifecycle_state, AgentLifecycleState::Active);
    }

    #[test]
    fn heartbeat_on_unknown_agent_is_not_found() {
        let directory = AgentDirectory::new(Duration::seconds(120));
        let err = directory.heartbeat(&AgentId::from_string("ghost"), AgentHealth::Healthy).unwrap_err();
        assert!(matches!(err, FabricError::NotFound(_)));
    }

    #[test]
    fn expire_sweep_marks_idle_then_offline_by_elapsed_time() {
        let ttl = Duration::seconds(120);
        let directory = AgentDirectory::new(ttl);
        directory.register(AgentId::from_string("a1"), MachineId::from_string("m1"), IndexSet::new(), IndexSet::new());
        directory.heartbeat(&AgentId::from_string("a1"), AgentHealth::Healthy).unwrap();

        let now = Utc::now() + Duration::seconds(70);
        directory.expire_sweep(now, Duration::days(7));
        assert_eq!(directory.status(&AgentId::from_string("a1")).unwrap().lifecycle_state, AgentLifecycleState::Idle);

        let later = Utc::now() + Duration::seconds(200);
        directory.expire_sweep(later, Duration::days(7));
        assert_eq!(directory.status(&AgentId::from_string("a1")).unwrap().lifecycle_state, AgentLifecycleState::Offline);
    }

    #[test]
    fn expire_sweep_purges_past_retention_horizon() {
        let directory = AgentDirectory::new(Duration::seconds(120));
        directory.register(AgentId::from_string("a1"), MachineId::from_string("m1"), IndexSet::new(), IndexSet::new());
        let far_future = Utc::now() + Duration::days(8);
        directory.expire_sweep(far_future, Duration::days(7));
        assert!(directory.status(&AgentId::from_string("a1")).is_err());
    }

    #[test]
    fn list_filters_by_capability() {
        let directory = AgentDirectory::new(Duration::seconds(120));
        let mut caps = IndexSet::new();
        caps.insert("can_deploy".to_string());
        directory.register(AgentId::from_string("a1"), MachineId::from_string("m1"), IndexSet::new(), caps);
        directory.register(AgentId::from_string("a2"), MachineId::from_string("m1"), IndexSet::new(), IndexSet::new());
        let found = directory.list(AgentFilter { capability: Some("can_deploy".into()), ..Default::default() });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, AgentId::from_string("a1"));
    }
}
