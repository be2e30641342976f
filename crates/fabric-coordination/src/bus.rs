//! Broadcast, delegation, and query: the three coordination bus
//! operations (C6).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use fabric_directory::{AgentDirectory, AgentFilter};
use fabric_protocol::{
    AgentId, Category, DeliveryState, FabricResult, Message, MessageId, MessageKind, Severity,
    TargetSelector,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::delivery::{attempts_exhausted, next_retry_at, MAX_ATTEMPTS};
use crate::inbox::InboxTable;

#[derive(Debug, Clone)]
struct DeliveryRecord {
    attempts: u32,
    next_retry: DateTime<Utc>,
    acked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationStatus {
    Assigned(AgentId),
    PendingNoAgent,
}

#[derive(Debug, Clone)]
struct PendingDelegation {
    delegation_id: fabric_protocol::DelegationId,
    required_capabilities: Vec<String>,
    priority: i64,
    queued_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

pub struct CoordinationBus {
    inboxes: InboxTable,
    directory: Arc<AgentDirectory>,
    messages: DashMap<MessageId, Message>,
    delivery_records: DashMap<(MessageId, AgentId), DeliveryRecord>,
    last_assigned: DashMap<AgentId, DateTime<Utc>>,
    pending_delegations: Mutex<Vec<PendingDelegation>>,
    assigned_delegations: DashMap<fabric_protocol::DelegationId, AgentId>,
    query_responses: DashMap<MessageId, Mutex<Vec<Value>>>,
    max_inbox_depth: usize,
}

impl CoordinationBus {
    pub fn new(directory: Arc<AgentDirectory>, max_inbox_depth: usize) -> Self {
        CoordinationBus {
            inboxes: InboxTable::new(),
            directory,
            messages: DashMap::new(),
            delivery_records: DashMap::new(),
            last_assigned: DashMap::new(),
            pending_delegations: Mutex::new(Vec::new()),
            assigned_delegations: DashMap::new(),
            query_responses: DashMap::new(),
            max_inbox_depth,
        }
    }

    fn resolve_targets(&self, selector: &TargetSelector) -> Vec<AgentId> {
        match selector {
            TargetSelector::AllAgents => self
                .directory
                .list(AgentFilter { lifecycle_state: Some(fabric_protocol::AgentLifecycleState::Active), ..Default::default() })
                .into_iter()
                .map(|a| a.agent_id)
                .collect(),
            TargetSelector::Agent { agent_id } => vec![agent_id.clone()],
            TargetSelector::Role { role } => self
                .directory
                .list(AgentFilter { role: Some(role.clone()), ..Default::default() })
                .into_iter()
                .map(|a| a.agent_id)
                .collect(),
            TargetSelector::Capability { capability } => self
                .directory
                .list(AgentFilter { capability: Some(capability.clone()), ..Default::default() })
                .into_iter()
                .map(|a| a.agent_id)
                .collect(),
        }
    }

    #[instrument(skip(self, payload), fields(category = ?category, severity = ?severity))]
    pub fn broadcast(
        &self,
        origin_agent: AgentId,
        payload: Value,
        category: Category,
        severity: Severity,
        target_selector: Option<TargetSelector>,
    ) -> FabricResult<MessageId> {
        let selector = target_selector.unwrap_or(TargetSelector::AllAgents);
        let targets = self.resolve_targets(&selector);
        let now = Utc::now();
        let message_id = MessageId::new_uuid();

        let mut delivery_state_per_target = IndexMap::new();
        for target in &targets {
            delivery_state_per_target.insert(target.clone(), DeliveryState::Pending);
        }

        let message = Message {
            message_id: message_id.clone(),
            kind: MessageKind::Broadcast,
            origin_agent,
            severity,
            category,
            payload,
            target_selector: selector,
            created_at: now,
            delivery_state_per_target,
        };
        self.messages.insert(message_id.clone(), message.clone());

        for target in &targets {
            self.attempt_delivery(&message_id, target);
        }
        Ok(message_id)
    }

    fn attempt_delivery(&self, message_id: &MessageId, target: &AgentId) {
        let Some(message) = self.messages.get(message_id).map(|m| m.value().clone()) else {
            return;
        };
        let record = self
            .delivery_records
            .entry((message_id.clone(), target.clone()))
            .or_insert_with(|| DeliveryRecord { attempts: 0, next_retry: Utc::now(), acked_at: None })
            .clone();
        if record.acked_at.is_some() || attempts_exhausted(record.attempts) {
            return;
        }

        let outcome = self.inboxes.push(target, message, self.max_inbox_depth);
        let now = Utc::now();
        let new_state = match &outcome {
            Ok(()) => DeliveryState::Delivered,
            Err(_) if attempts_exhausted(record.attempts + 1) => DeliveryState::Failed,
            Err(_) => DeliveryState::Pending,
        };
        self.delivery_records.insert(
            (message_id.clone(), target.clone()),
            DeliveryRecord { attempts: record.attempts + 1, next_retry: next_retry_at(now, record.attempts + 1), acked_at: None },
        );
        if let Some(mut message) = self.messages.get_mut(message_id) {
            message.delivery_state_per_target.insert(target.clone(), new_state);
        }
        if outcome.is_err() {
            warn!(%target, attempts = record.attempts + 1, "delivery attempt failed, will retry");
        }
    }

    /// Re-attempt any delivery whose backoff window has elapsed. Intended
    /// to be driven by a periodic background task.
    pub fn retry_due_deliveries(&self) {
        let now = Utc::now();
        let due: Vec<(MessageId, AgentId)> = self
            .delivery_records
            .iter()
            .filter(|entry| entry.value().acked_at.is_none() && entry.value().next_retry <= now && !attempts_exhausted(entry.value().attempts))
            .map(|entry| entry.key().clone())
            .collect();
        for (message_id, target) in due {
            self.attempt_delivery(&message_id, &target);
        }
    }

    pub fn fetch_inbox(&self, agent_id: &AgentId) -> Vec<Message> {
        self.inboxes.fetch(agent_id)
    }

    #[instrument(skip(self), fields(agent_id = %agent_id, message_id = %message_id))]
    pub fn acknowledge(&self, agent_id: &AgentId, message_id: &MessageId) -> FabricResult<()> {
        self.inboxes.acknowledge(agent_id, message_id)?;
        if let Some(mut message) = self.messages.get_mut(message_id) {
            message.delivery_state_per_target.insert(agent_id.clone(), DeliveryState::Acknowledged);
        }
        self.delivery_records
            .entry((message_id.clone(), agent_id.clone()))
            .and_modify(|r| r.acked_at = Some(Utc::now()));
        Ok(())
    }

    /// Picks the target with the lowest current inbox depth among agents
    /// matching every required capability, breaking ties by longest time
    /// since last assignment. Queues `pending_no_agent` if none are active.
    #[instrument(skip(self, required_capabilities))]
    pub fn delegate(
        &self,
        required_capabilities: Vec<String>,
        priority: i64,
        deadline: Option<DateTime<Utc>>,
    ) -> (fabric_protocol::DelegationId, DelegationStatus) {
        let delegation_id = fabric_protocol::DelegationId::new_uuid();
        let now = Utc::now();
        let effective_deadline = deadline.unwrap_or(now + Duration::minutes(15)).min(now + Duration::minutes(15));

        match self.pick_target(&required_capabilities) {
            Some(agent_id) => {
                self.last_assigned.insert(agent_id.clone(), now);
                self.assigned_delegations.insert(delegation_id.clone(), agent_id.clone());
                (delegation_id, DelegationStatus::Assigned(agent_id))
            }
            None => {
                self.pending_delegations.lock().push(PendingDelegation {
                    delegation_id: delegation_id.clone(),
                    required_capabilities,
                    priority,
                    queued_at: now,
                    deadline: effective_deadline,
                });
                info!(%delegation_id, "delegation queued pending_no_agent");
                (delegation_id, DelegationStatus::PendingNoAgent)
            }
        }
    }

    fn pick_target(&self, required_capabilities: &[String]) -> Option<AgentId> {
        let candidates = self.directory.list(AgentFilter { lifecycle_state: Some(fabric_protocol::AgentLifecycleState::Active), ..Default::default() });
        candidates
            .into_iter()
            .filter(|agent| required_capabilities.iter().all(|c| agent.capabilities.contains(c)))
            .min_by(|a, b| {
                self.inboxes
                    .depth(&a.agent_id)
                    .cmp(&self.inboxes.depth(&b.agent_id))
                    .then_with(|| {
                        let a_last = self.last_assigned.get(&a.agent_id).map(|r| *r.value());
                        let b_last = self.last_assigned.get(&b.agent_id).map(|r| *r.value());
                        a_last.cmp(&b_last)
                    })
            })
            .map(|a| a.agent_id)
    }

    /// Re-evaluate queued delegations; called whenever the directory emits
    /// a transition into `active`.
    pub fn reassess_pending_delegations(&self) -> Vec<(fabric_protocol::DelegationId, AgentId)> {
        let now = Utc::now();
        let mut assigned = Vec::new();
        let mut remaining = Vec::new();
        let mut queued = std::mem::take(&mut *self.pending_delegations.lock());
        queued.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.queued_at.cmp(&b.queued_at)));
        for pending in queued {
            if now > pending.deadline {
                continue;
            }
            match self.pick_target(&pending.required_capabilities) {
                Some(agent_id) => {
                    self.last_assigned.insert(agent_id.clone(), now);
                    self.assigned_delegations.insert(pending.delegation_id.clone(), agent_id.clone());
                    assigned.push((pending.delegation_id.clone(), agent_id));
                }
                None => remaining.push(pending),
            }
        }
        *self.pending_delegations.lock() = remaining;
        assigned
    }

    /// Cancels a delegation. If it was already assigned, the assigned agent
    /// is notified with a `cancel` broadcast but any side effects it already
    /// started are not undone — it may end up receiving both the original
    /// delegation and this cancellation. Returns `NotFound` if the
    /// delegation id is unknown (never queued, or already resolved and
    /// forgotten).
    #[instrument(skip(self), fields(delegation_id = %delegation_id))]
    pub fn cancel_delegation(&self, origin_agent: AgentId, delegation_id: &fabric_protocol::DelegationId) -> FabricResult<()> {
        if let Some((_, agent_id)) = self.assigned_delegations.remove(delegation_id) {
            self.broadcast(
                origin_agent,
                serde_json::json!({"delegation_id": delegation_id.as_str(), "cancelled": true}),
                Category::Agent,
                Severity::Info,
                Some(TargetSelector::Agent { agent_id }),
            )?;
            return Ok(());
        }
        let mut pending = self.pending_delegations.lock();
        let before = pending.len();
        pending.retain(|p| &p.delegation_id != delegation_id);
        if pending.len() < before {
            Ok(())
        } else {
            Err(fabric_protocol::FabricError::NotFound(delegation_id.to_string()))
        }
    }

    pub fn record_query_response(&self, message_id: &MessageId, response: Value) {
        self.query_responses.entry(message_id.clone()).or_default().lock().push(response);
    }

    /// Broadcasts `question` and collects responses arriving via
    /// `record_query_response` within `window`.
    pub async fn query(
        &self,
        origin_agent: AgentId,
        question: Value,
        category: Category,
        scope_selector: Option<TargetSelector>,
        window: StdDuration,
    ) -> FabricResult<Vec<Value>> {
        let message_id = self.broadcast(origin_agent, question, category, Severity::Info, scope_selector)?;
        self.query_responses.insert(message_id.clone(), Mutex::new(Vec::new()));
        tokio::time::sleep(window).await;
        Ok(self
            .query_responses
            .remove(&message_id)
            .map(|(_, responses)| responses.into_inner())
            .unwrap_or_default())
    }
}
