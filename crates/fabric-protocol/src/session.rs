//! Transport session state, owned exclusively by the MCP transport.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::SessionState;
use crate::ids::{AgentId, SessionId};

/// A call awaiting a response on this session, tracked so a reconnect can
/// report which in-flight calls were interrupted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCall {
    pub request_id: String,
    pub tool_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub state: SessionState,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub pending_calls: Vec<PendingCall>,
    /// Buffered SSE events not yet delivered, replayed on recovery.
    pub outbound_buffer: Vec<Value>,
    /// Presented to the client; redeemable within the recovery horizon to
    /// resume this session under a new transport connection.
    pub recovery_token: String,
}

impl Session {
    pub fn open(agent_id: AgentId) -> Self {
        let now = Utc::now();
        Session {
            session_id: SessionId::new_uuid(),
            agent_id,
            state: SessionState::Open,
            opened_at: now,
            last_activity: now,
            pending_calls: Vec::new(),
            outbound_buffer: Vec::new(),
            recovery_token: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_after: chrono::Duration) -> bool {
        self.state == SessionState::Open && now.signed_duration_since(self.last_activity) > idle_after
    }

    pub fn is_recoverable(&self, now: DateTime<Utc>, recovery_horizon: chrono::Duration) -> bool {
        matches!(self.state, SessionState::Idle | SessionState::Closing)
            && now.signed_duration_since(self.last_activity) <= recovery_horizon
    }
}

/// Roles recognized by the transport's authenticator seam, used to scope
/// which tools an incoming session may invoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedRoles(pub IndexSet<String>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_starts_in_open_state_with_fresh_token() {
        let session = Session::open(AgentId::from_string("a1"));
        assert_eq!(session.state, SessionState::Open);
        assert!(!session.recovery_token.is_empty());
    }

    #[test]
    fn is_idle_false_immediately_after_open() {
        let session = Session::open(AgentId::from_string("a1"));
        assert!(!session.is_idle(Utc::now(), chrono::Duration::seconds(30)));
    }

    #[test]
    fn is_recoverable_requires_idle_or_closing_state() {
        let mut session = Session::open(AgentId::from_string("a1"));
        assert!(!session.is_recoverable(Utc::now(), chrono::Duration::minutes(5)));
        session.state = SessionState::Idle;
        assert!(session.is_recoverable(Utc::now(), chrono::Duration::minutes(5)));
    }
}
