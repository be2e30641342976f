//! Wire types for a sync round: `SyncHello -> SyncBatch -> SyncAck`.

use fabric_protocol::{MachineId, MemoryId, MemoryItem, Scope};
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;

/// One entry of a machine's local write log. Carries the full item so the
/// receiving peer can apply it directly through C1's version check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: MemoryId,
    pub version: u64,
    pub origin_machine: MachineId,
    pub scope: Scope,
    pub item: MemoryItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHello {
    pub machine_id: MachineId,
    pub vector_clock: VectorClock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    pub records: Vec<LogRecord>,
    pub new_vector_clock: VectorClock,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAck {
    pub up_to_vector_clock: VectorClock,
}

/// Sent by the peer instead of a `SyncBatch` when the initiator's clock
/// lags behind the peer's oldest retained log record for some machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullResyncRequired {
    pub machine_id: MachineId,
    pub oldest_retained_version: u64,
}

/// What a peer's `/sync` endpoint answers a `SyncHello` with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncResponse {
    Batch(SyncBatch),
    FullResyncRequired(FullResyncRequired),
}
