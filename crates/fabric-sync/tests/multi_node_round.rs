//! Black-box two-node sync round over a real HTTP server, mirroring the
//! `/sync`, `/sync/ack`, `/sync/snapshot` surface `apps/fabric-gateway`
//! exposes in front of a `SyncEngine`. Drives `run_round` as the only
//! client a real deployment ever uses, against an in-process axum server
//! standing in for the remote peer.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use fabric_protocol::{AgentId, Category, MachineId, MemoryId, MemoryItem, Scope};
use fabric_storage::{FileStorageEngine, ScanFilter, StorageConfig, StorageEngine};
use fabric_sync::{run_round, LogRecord, PeerConfig, SyncAck, SyncConfig, SyncEngine, SyncHello, SyncResponse};
use indexmap::IndexSet;

fn unique_root(name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    std::env::temp_dir().join(format!("{name}-{nanos}"))
}

fn item(id: &str, version: u64, origin: &str) -> MemoryItem {
    let now = chrono::Utc::now();
    MemoryItem {
        id: MemoryId::from_string(id),
        content: "payload".into(),
        category: Category::Infrastructure,
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

fn record(id: &str, version: u64, origin: &str) -> LogRecord {
    let i = item(id, version, origin);
    LogRecord { id: i.id.clone(), version: i.version, origin_machine: i.origin_machine.clone(), scope: i.scope, item: i }
}

async fn hello_handler(State(engine): State<Arc<SyncEngine>>, Json(hello): Json<SyncHello>) -> Json<SyncResponse> {
    Json(engine.respond_to_hello(&hello).unwrap())
}

async fn ack_handler(State(_engine): State<Arc<SyncEngine>>, Json(_ack): Json<SyncAck>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn snapshot_handler(State(engine): State<Arc<SyncEngine>>) -> Json<Vec<MemoryItem>> {
    Json(engine.scan_for_seeding().await.unwrap())
}

/// Stands in for `apps/fabric-gateway`'s sync routes, bound to a random
/// port, serving `peer_engine`.
async fn spawn_peer(peer_engine: Arc<SyncEngine>) -> String {
    let app = Router::new()
        .route("/sync", post(hello_handler))
        .route("/sync/ack", post(ack_handler))
        .route("/sync/snapshot", get(snapshot_handler))
        .with_state(peer_engine);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn run_round_pulls_peer_writes_into_local_storage() {
    let root_a = unique_root("fabric-sync-node-a");
    let root_b = unique_root("fabric-sync-node-b");
    let storage_a = Arc::new(FileStorageEngine::new(&root_a, StorageConfig::defaults()));
    let storage_b = Arc::new(FileStorageEngine::new(&root_b, StorageConfig::defaults()));

    let engine_b = Arc::new(SyncEngine::new(
        MachineId::from_string("node-b"),
        storage_b.clone() as Arc<dyn StorageEngine>,
        vec![],
        SyncConfig::default(),
    ));
    engine_b.note_local_write(record("shared-1", 1, "node-b"));
    engine_b.note_local_write(record("shared-2", 2, "node-b"));
    let peer_b_url = spawn_peer(engine_b.clone()).await;

    let peer_b = PeerConfig { machine_id: MachineId::from_string("node-b"), base_url: peer_b_url, project_tags: Default::default() };
    let engine_a = SyncEngine::new(MachineId::from_string("node-a"), storage_a.clone() as Arc<dyn StorageEngine>, vec![peer_b], SyncConfig::default());

    let ack = run_round(&engine_a, &engine_a.peers()[0]).await.unwrap();
    assert_eq!(ack.up_to_vector_clock.get(&MachineId::from_string("node-b")), 2);

    let stored = storage_a.scan(ScanFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 2);

    // A second round against an unchanged peer log pulls nothing new but
    // must not fail or duplicate anything (C1's idempotent version check).
    let ack2 = run_round(&engine_a, &engine_a.peers()[0]).await.unwrap();
    assert_eq!(ack2.up_to_vector_clock.get(&MachineId::from_string("node-b")), 2);
    let stored_again = storage_a.scan(ScanFilter::default()).await.unwrap();
    assert_eq!(stored_again.len(), 2);

    let _ = tokio::fs::remove_dir_all(root_a).await;
    let _ = tokio::fs::remove_dir_all(root_b).await;
}

#[tokio::test]
async fn run_round_falls_back_to_full_snapshot_when_peer_has_trimmed_its_log() {
    let root_a = unique_root("fabric-sync-resync-a");
    let root_b = unique_root("fabric-sync-resync-b");
    let storage_a = Arc::new(FileStorageEngine::new(&root_a, StorageConfig::defaults()));
    let storage_b = Arc::new(FileStorageEngine::new(&root_b, StorageConfig::defaults()));

    // node-b has the item in storage but its write log starts at version 5,
    // so any hello below that forces a snapshot pull rather than a batch.
    storage_b.put(item("old-item", 5, "node-b")).await.unwrap();
    let engine_b = Arc::new(SyncEngine::new(
        MachineId::from_string("node-b"),
        storage_b.clone() as Arc<dyn StorageEngine>,
        vec![],
        SyncConfig::default(),
    ));
    engine_b.note_local_write(record("new-item", 5, "node-b"));
    let peer_b_url = spawn_peer(engine_b.clone()).await;

    let peer_b = PeerConfig { machine_id: MachineId::from_string("node-b"), base_url: peer_b_url, project_tags: Default::default() };
    let engine_a = SyncEngine::new(MachineId::from_string("node-a"), storage_a.clone() as Arc<dyn StorageEngine>, vec![peer_b], SyncConfig::default());

    run_round(&engine_a, &engine_a.peers()[0]).await.unwrap();

    let stored = storage_a.scan(ScanFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, MemoryId::from_string("old-item"));

    let _ = tokio::fs::remove_dir_all(root_a).await;
    let _ = tokio::fs::remove_dir_all(root_b).await;
}
