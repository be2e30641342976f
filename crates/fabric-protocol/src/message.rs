//! Message types flowing through the coordination bus.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{Category, DeliveryState, MessageKind, Severity};
use crate::ids::{AgentId, MessageId};

/// How a delegate's target is chosen, or a broadcast's recipients are
/// scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSelector {
    Agent { agent_id: AgentId },
    Role { role: String },
    Capability { capability: String },
    AllAgents,
}

/// Owned exclusively by the coordination bus. `delivery_state_per_target`
/// tracks at-least-once delivery progress per resolved recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub kind: MessageKind,
    pub origin_agent: AgentId,
    pub severity: Severity,
    pub category: Category,
    pub payload: Value,
    pub target_selector: TargetSelector,
    pub created_at: DateTime<Utc>,
    pub delivery_state_per_target: IndexMap<AgentId, DeliveryState>,
}

impl Message {
    pub fn all_acknowledged(&self) -> bool {
        !self.delivery_state_per_target.is_empty()
            && self
                .delivery_state_per_target
                .values()
                .all(|s| *s == DeliveryState::Acknowledged)
    }

    pub fn has_unresolved_targets(&self) -> bool {
        self.delivery_state_per_target
            .values()
            .any(|s| matches!(s, DeliveryState::Pending | DeliveryState::PendingNoAgent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(states: &[(&str, DeliveryState)]) -> Message {
        let mut delivery_state_per_target = IndexMap::new();
        for (agent, state) in states {
            delivery_state_per_target.insert(AgentId::from_string(*agent), *state);
        }
        Message {
            message_id: MessageId::new_uuid(),
            kind: MessageKind::Broadcast,
            origin_agent: AgentId::from_string("origin"),
            severity: Severity::Info,
            category: Category::Agent,
            payload: Value::Null,
            target_selector: TargetSelector::AllAgents,
            created_at: Utc::now(),
            delivery_state_per_target,
        }
    }

    #[test]
    fn all_acknowledged_requires_at_least_one_target() {
        let msg = sample(&[]);
        assert!(!msg.all_acknowledged());
    }

    #[test]
    fn all_acknowledged_true_when_every_target_acked() {
        let msg = sample(&[("a1", DeliveryState::Acknowledged), ("a2", DeliveryState::Acknowledged)]);
        assert!(msg.all_acknowledged());
    }

    #[test]
    fn has_unresolved_targets_detects_pending_no_agent() {
        let msg = sample(&[("a1", DeliveryState::PendingNoAgent)]);
        assert!(msg.has_unresolved_targets());
    }
}
