//! Per-agent inbox: FIFO by `created_at`, severity ties broken by higher
//! severity first. An unacknowledged message stays visible on every fetch
//! until acked or expired.

use dashmap::DashMap;
use fabric_protocol::{AgentId, FabricError, FabricResult, Message, MessageId, Severity};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct InboxTable {
    inboxes: DashMap<AgentId, Mutex<Vec<Message>>>,
}

impl InboxTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self, agent_id: &AgentId) -> usize {
        self.inboxes.get(agent_id).map(|inbox| inbox.lock().len()).unwrap_or(0)
    }

    /// Inserts keeping the FIFO-by-`created_at`, severity-break ordering so
    /// a fetch never needs to re-sort.
    pub fn push(&self, agent_id: &AgentId, message: Message, max_depth: usize) -> FabricResult<()> {
        let inbox = self.inboxes.entry(agent_id.clone()).or_default();
        let mut guard = inbox.lock();
        if guard.len() >= max_depth {
            return Err(FabricError::InboxOverflow(agent_id.to_string()));
        }
        let position = guard
            .iter()
            .position(|existing| order_key(existing) > order_key(&message))
            .unwrap_or(guard.len());
        guard.insert(position, message);
        Ok(())
    }

    /// All unacknowledged messages, oldest/highest-severity first.
    pub fn fetch(&self, agent_id: &AgentId) -> Vec<Message> {
        self.inboxes
            .get(agent_id)
            .map(|inbox| inbox.lock().clone())
            .unwrap_or_default()
    }

    pub fn acknowledge(&self, agent_id: &AgentId, message_id: &MessageId) -> FabricResult<()> {
        let inbox = self.inboxes.get(agent_id).ok_or_else(|| FabricError::NotFound(agent_id.to_string()))?;
        let mut guard = inbox.lock();
        let before = guard.len();
        guard.retain(|m| m.message_id != *message_id);
        if guard.len() == before {
            return Err(FabricError::NotFound(message_id.to_string()));
        }
        Ok(())
    }
}

fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 0,
        Severity::Warning => 1,
        Severity::Info => 2,
    }
}

fn order_key(message: &Message) -> (chrono::DateTime<chrono::Utc>, u8) {
    (message.created_at, severity_rank(message.severity))
}
