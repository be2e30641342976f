//! Shared state every route handler closes over, modeled on `aios-api`'s
//! `AppState`: one long-lived container passed by reference, not a
//! grab-bag of globals.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use fabric_protocol::MachineId;

use crate::auth::Authenticator;
use crate::dispatch::ToolDispatcher;
use crate::session::SessionTable;

/// Cheap accessors into process-wide counters owned elsewhere (the
/// directory, the memory store, the sync engine) so `/health` can report
/// on them without this crate depending on those crates directly.
pub type Gauge = Arc<dyn Fn() -> usize + Send + Sync>;
pub type FloatGauge = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionTable>,
    pub authenticator: Arc<dyn Authenticator>,
    pub dispatcher: Arc<dyn ToolDispatcher>,
    pub machine_id: MachineId,
    pub per_call_timeout: StdDuration,
    pub started_at: DateTime<Utc>,
    pub agent_count: Gauge,
    pub memory_count: Gauge,
    pub sync_lag_s: FloatGauge,
}
