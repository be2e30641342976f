//! Session table: lock-free lookup by `SessionId`, one mutex per session
//! guarding its outbound buffer, pending calls, and `last_activity`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use fabric_protocol::{AgentId, FabricError, FabricResult, Session, SessionId, SessionState};
use parking_lot::Mutex;
use serde_json::Value;

use crate::auth::Principal;

/// A session plus the transport-local bookkeeping the wire type doesn't
/// carry: which principal opened it and how many outbound events it has
/// buffered, capped so a disconnected client can't grow it unbounded.
pub struct SessionHandle {
    pub session: Session,
    pub principal: Principal,
}

const MAX_OUTBOUND_BUFFER: usize = 1000;

#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, Arc<Mutex<SessionHandle>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, principal: Principal) -> SessionId {
        let session = Session::open(principal.agent_id.clone());
        let session_id = session.session_id.clone();
        self.sessions.insert(session_id.clone(), Arc::new(Mutex::new(SessionHandle { session, principal })));
        session_id
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<Mutex<SessionHandle>>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Bumps `last_activity` and, if idle, brings the session back to
    /// `Open` — any traffic on a session counts as activity.
    pub fn touch(&self, session_id: &SessionId) -> FabricResult<()> {
        let handle = self.get(session_id).ok_or(FabricError::SessionExpired)?;
        let mut guard = handle.lock();
        guard.session.last_activity = Utc::now();
        if guard.session.state == SessionState::Idle {
            guard.session.state = SessionState::Open;
        }
        Ok(())
    }

    pub fn push_outbound(&self, session_id: &SessionId, event: Value) -> FabricResult<()> {
        let handle = self.get(session_id).ok_or(FabricError::SessionExpired)?;
        let mut guard = handle.lock();
        if guard.session.outbound_buffer.len() >= MAX_OUTBOUND_BUFFER {
            guard.session.outbound_buffer.remove(0);
        }
        guard.session.outbound_buffer.push(event);
        Ok(())
    }

    pub fn begin_call(&self, session_id: &SessionId, request_id: String, tool_name: String) -> FabricResult<()> {
        let handle = self.get(session_id).ok_or(FabricError::SessionExpired)?;
        let mut guard = handle.lock();
        guard.session.pending_calls.push(fabric_protocol::PendingCall {
            request_id,
            tool_name,
            started_at: Utc::now(),
        });
        Ok(())
    }

    pub fn end_call(&self, session_id: &SessionId, request_id: &str) {
        if let Some(handle) = self.get(session_id) {
            let mut guard = handle.lock();
            guard.session.pending_calls.retain(|call| call.request_id != request_id);
        }
    }

    /// Marks every session idle past `idle_after` and closed past
    /// `session_timeout`, dropping closed sessions once they're also past
    /// `recovery_horizon`. Returns the number of sessions transitioned.
    pub fn sweep(&self, idle_after: Duration, session_timeout: Duration, recovery_horizon: Duration) -> usize {
        let now = Utc::now();
        let mut transitioned = 0usize;
        let mut to_remove = Vec::new();
        for entry in self.sessions.iter() {
            let mut guard = entry.value().lock();
            let since_activity = now.signed_duration_since(guard.session.last_activity);
            match guard.session.state {
                SessionState::Open if since_activity > idle_after => {
                    guard.session.state = SessionState::Idle;
                    transitioned += 1;
                }
                SessionState::Idle if since_activity > session_timeout => {
                    guard.session.state = SessionState::Closing;
                    transitioned += 1;
                }
                SessionState::Closing if since_activity > recovery_horizon => {
                    guard.session.state = SessionState::Closed;
                    transitioned += 1;
                }
                _ => {}
            }
            if guard.session.state == SessionState::Closed {
                to_remove.push(entry.key().clone());
            }
        }
        for session_id in to_remove {
            self.sessions.remove(&session_id);
        }
        transitioned
    }

    /// Restores a session from its recovery token, returning the buffered
    /// outbound events not yet acknowledged. Fails once the session has
    /// aged out of its recovery horizon (and so was already dropped by
    /// `sweep`) or the token doesn't match.
    pub fn recover(&self, session_id: &SessionId, recovery_token: &str) -> FabricResult<Vec<Value>> {
        let handle = self.get(session_id).ok_or(FabricError::SessionExpired)?;
        let mut guard = handle.lock();
        if guard.session.recovery_token != recovery_token {
            return Err(FabricError::Unauthorized);
        }
        if !matches!(guard.session.state, SessionState::Idle | SessionState::Closing) {
            return Err(FabricError::SessionExpired);
        }
        guard.session.state = SessionState::Open;
        guard.session.last_activity = Utc::now();
        Ok(std::mem::take(&mut guard.session.outbound_buffer))
    }

    pub fn principal_of(&self, session_id: &SessionId) -> Option<Principal> {
        self.get(session_id).map(|handle| handle.lock().principal.clone())
    }
}
