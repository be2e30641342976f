//! Sync round logic: building batches for a peer's hello, applying a
//! received batch idempotently through C1, and catchup backpressure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use fabric_protocol::{FabricError, FabricResult, MachineId};
use fabric_storage::{ScanFilter, StorageEngine, MAX_RECORD_BYTES};
use tracing::{info, instrument, warn};

use crate::clock::VectorClock;
use crate::log::WriteLog;
use crate::peer::{eligible_for_peer, PeerConfig};
use crate::wire::{FullResyncRequired, LogRecord, SyncAck, SyncBatch, SyncHello, SyncResponse};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub t_sync: StdDuration,
    pub max_records_per_round: usize,
    pub max_lag: u64,
    pub peer_timeout: StdDuration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            t_sync: StdDuration::from_secs(30),
            max_records_per_round: 500,
            max_lag: 10_000,
            peer_timeout: StdDuration::from_secs(10),
        }
    }
}

pub struct SyncEngine {
    pub machine_id: MachineId,
    storage: Arc<dyn StorageEngine>,
    write_log: WriteLog,
    vector_clock: parking_lot::RwLock<VectorClock>,
    unapplied_lag: AtomicU64,
    config: SyncConfig,
    peers: Vec<PeerConfig>,
    http: reqwest::Client,
}

impl SyncEngine {
    pub fn new(machine_id: MachineId, storage: Arc<dyn StorageEngine>, peers: Vec<PeerConfig>, config: SyncConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.peer_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        SyncEngine {
            machine_id,
            storage,
            write_log: WriteLog::new(),
            vector_clock: parking_lot::RwLock::new(VectorClock::new()),
            unapplied_lag: AtomicU64::new(0),
            config,
            peers,
            http,
        }
    }

    /// Recorded whenever a local write lands through C1, so it becomes
    /// eligible to ship to peers on the next round.
    pub fn note_local_write(&self, record: LogRecord) {
        self.vector_clock.write().advance(record.origin_machine.clone(), record.version);
        self.write_log.append(record);
    }

    pub fn is_catching_up(&self) -> bool {
        self.unapplied_lag.load(Ordering::Relaxed) > self.config.max_lag
    }

    /// Records still owed from the last applied batch, for `/health`.
    pub fn unapplied_lag(&self) -> u64 {
        self.unapplied_lag.load(Ordering::Relaxed)
    }

    pub fn vector_clock(&self) -> VectorClock {
        self.vector_clock.read().clone()
    }

    /// Server-side: answer a peer's hello, either with a scoped batch or a
    /// `FullResyncRequired` if their clock has fallen behind what we still
    /// retain for some machine.
    #[instrument(skip(self, hello))]
    pub fn respond_to_hello(&self, hello: &SyncHello) -> FabricResult<SyncResponse> {
        if self.is_catching_up() {
            return Err(FabricError::PeerUnreachable(format!("{} is catching up", self.machine_id)));
        }
        for (machine, oldest) in self.write_log.oldest_retained_versions() {
            if hello.vector_clock.get(&machine) + 1 < oldest {
                return Ok(SyncResponse::FullResyncRequired(FullResyncRequired {
                    machine_id: machine,
                    oldest_retained_version: oldest,
                }));
            }
        }
        Ok(SyncResponse::Batch(self.build_batch(hello)))
    }

    fn build_batch(&self, hello: &SyncHello) -> SyncBatch {
        let peer = self.peers.iter().find(|p| p.machine_id == hello.machine_id);
        let (candidates, has_more) = self.write_log.records_after(&hello.vector_clock, self.config.max_records_per_round);
        let records: Vec<LogRecord> = candidates
            .into_iter()
            .filter(|r| peer.map(|p| eligible_for_peer(&r.item, p)).unwrap_or(true))
            .collect();
        SyncBatch { records, new_vector_clock: self.vector_clock(), has_more }
    }

    /// Initiator-side: apply a received batch idempotently via C1's
    /// version check, advancing the vector clock per applied record.
    #[instrument(skip(self, batch), fields(records = batch.records.len()))]
    pub async fn apply_batch(&self, batch: SyncBatch) -> FabricResult<SyncAck> {
        let mut clock = self.vector_clock();
        let mut applied = 0u64;
        for record in batch.records {
            if record.item.content.len() > MAX_RECORD_BYTES {
                warn!(id = %record.id, "rejecting oversized sync record");
                return Err(FabricError::RecordTooLarge { size_bytes: record.item.content.len() as u64 });
            }
            match self.storage.put(record.item.clone()).await {
                Ok(_) => {
                    clock.advance(record.origin_machine.clone(), record.version);
                    applied += 1;
                }
                Err(FabricError::VersionConflict { .. }) => {
                    // Already have an equal-or-newer version from this origin; idempotent no-op.
                    clock.advance(record.origin_machine.clone(), record.version);
                }
                Err(e) => return Err(e),
            }
        }
        *self.vector_clock.write() = clock.clone();
        clock.merge(&batch.new_vector_clock);
        let remaining = if batch.has_more { self.config.max_records_per_round as u64 } else { 0 };
        self.unapplied_lag.store(remaining, Ordering::Relaxed);
        info!(applied, has_more = batch.has_more, "sync batch applied");
        Ok(SyncAck { up_to_vector_clock: clock })
    }

    /// Applies a full snapshot: every item through C1's idempotent version
    /// check, same as an incremental batch, then adopts the max version
    /// seen per origin as our new clock floor for that machine.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn apply_snapshot(&self, items: Vec<fabric_protocol::MemoryItem>) -> FabricResult<SyncAck> {
        let mut clock = self.vector_clock();
        for item in items {
            let (origin, version) = (item.origin_machine.clone(), item.version);
            match self.storage.put(item).await {
                Ok(_) | Err(FabricError::VersionConflict { .. }) => clock.advance(origin, version),
                Err(e) => return Err(e),
            }
        }
        *self.vector_clock.write() = clock.clone();
        self.unapplied_lag.store(0, Ordering::Relaxed);
        Ok(SyncAck { up_to_vector_clock: clock })
    }

    /// Whether our clock has fallen far enough behind `peer_oldest` that a
    /// full resync (rather than incremental catch-up) is required.
    pub fn needs_full_resync(&self, peer_oldest: &BTreeMap<MachineId, u64>) -> bool {
        let clock = self.vector_clock();
        peer_oldest.iter().any(|(machine, oldest)| clock.get(machine) + 1 < *oldest)
    }

    pub async fn scan_for_seeding(&self) -> FabricResult<Vec<fabric_protocol::MemoryItem>> {
        self.storage.scan(ScanFilter { include_tombstones: true, ..Default::default() }).await
    }

    pub fn peers(&self) -> &[PeerConfig] {
        &self.peers
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_protocol::{AgentId, Category, MemoryId, MemoryItem, Scope};
    use fabric_storage::{FileStorageEngine, StorageConfig};
    use indexmap::IndexSet;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_root(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn item(version: u64, origin: &str) -> MemoryItem {
        let now = chrono::Utc::now();
        MemoryItem {
            id: MemoryId::from_string("shared-id"),
            content: "payload".into(),
            category: Category::Project,
            tags: IndexSet::new(),
            context: None,
            scope: Scope::NetworkShared,
            origin_machine: MachineId::from_string(origin),
            origin_agent: AgentId::from_string("a1"),
            created_at: now,
            updated_at: now,
            version,
            tombstone: false,
            format_version: 1,
            vector_pending: false,
        }
    }

    fn record(version: u64, origin: &str) -> LogRecord {
        let i = item(version, origin);
        LogRecord { id: i.id.clone(), version: i.version, origin_machine: i.origin_machine.clone(), scope: i.scope, item: i }
    }

    #[tokio::test]
    async fn respond_to_hello_only_returns_records_newer_than_hello_clock() {
        let root = unique_root("fabric-sync-build");
        let storage = Arc::new(FileStorageEngine::new(&root, StorageConfig::defaults()));
        let engine = SyncEngine::new(MachineId::from_string("m1"), storage, vec![], SyncConfig::default());
        engine.note_local_write(record(1, "m1"));
        engine.note_local_write(record(2, "m1"));
        let mut hello_clock = VectorClock::new();
        hello_clock.advance(MachineId::from_string("m1"), 1);
        let response = engine.respond_to_hello(&SyncHello { machine_id: MachineId::from_string("peer"), vector_clock: hello_clock }).unwrap();
        let crate::wire::SyncResponse::Batch(batch) = response else { panic!("expected a batch") };
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].version, 2);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn respond_to_hello_requests_full_resync_when_clock_predates_retention() {
        let root = unique_root("fabric-sync-fullresync");
        let storage = Arc::new(FileStorageEngine::new(&root, StorageConfig::defaults()));
        let engine = SyncEngine::new(MachineId::from_string("m1"), storage, vec![], SyncConfig::default());
        engine.note_local_write(record(10, "m1"));
        let response = engine.respond_to_hello(&SyncHello { machine_id: MachineId::from_string("peer"), vector_clock: VectorClock::new() }).unwrap();
        assert!(matches!(response, crate::wire::SyncResponse::FullResyncRequired(_)));
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn apply_batch_is_idempotent_on_replay() {
        let root = unique_root("fabric-sync-apply");
        let storage = Arc::new(FileStorageEngine::new(&root, StorageConfig::defaults()));
        let engine = SyncEngine::new(MachineId::from_string("m2"), storage, vec![], SyncConfig::default());
        let batch = SyncBatch { records: vec![record(3, "m1")], new_vector_clock: VectorClock::new(), has_more: false };
        let ack1 = engine.apply_batch(batch.clone()).await.unwrap();
        let ack2 = engine.apply_batch(batch).await.unwrap();
        assert_eq!(ack1.up_to_vector_clock.get(&MachineId::from_string("m1")), 3);
        assert_eq!(ack2.up_to_vector_clock.get(&MachineId::from_string("m1")), 3);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn oversized_record_is_rejected() {
        let root = unique_root("fabric-sync-oversize");
        let storage = Arc::new(FileStorageEngine::new(&root, StorageConfig::defaults()));
        let engine = SyncEngine::new(MachineId::from_string("m2"), storage, vec![], SyncConfig::default());
        let mut big = record(1, "m1");
        big.item.content = "x".repeat(MAX_RECORD_BYTES + 1);
        let batch = SyncBatch { records: vec![big], new_vector_clock: VectorClock::new(), has_more: false };
        let err = engine.apply_batch(batch).await.unwrap_err();
        assert!(matches!(err, FabricError::RecordTooLarge { .. }));
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[test]
    fn needs_full_resync_when_clock_behind_oldest_retained() {
        let storage_root = unique_root("fabric-sync-resync");
        let storage = Arc::new(FileStorageEngine::new(&storage_root, StorageConfig::defaults()));
        let engine = SyncEngine::new(MachineId::from_string("m2"), storage, vec![], SyncConfig::default());
        let mut peer_oldest = BTreeMap::new();
        peer_oldest.insert(MachineId::from_string("m1"), 10);
        assert!(engine.needs_full_resync(&peer_oldest));
    }
}
