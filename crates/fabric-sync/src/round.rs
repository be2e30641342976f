//! Drives a single pairwise round over HTTP against one peer, and a
//! background task that schedules rounds `T_sync`-jittered round-robin.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use fabric_protocol::FabricResult;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::SyncEngine;
use crate::peer::PeerConfig;
use crate::wire::{SyncAck, SyncHello, SyncResponse};

/// `SyncHello -> SyncBatch -> SyncAck` against a single peer over HTTP,
/// falling back to a full snapshot pull when the peer reports our clock
/// predates what it still retains.
pub async fn run_round(engine: &SyncEngine, peer: &PeerConfig) -> FabricResult<SyncAck> {
    let hello = SyncHello { machine_id: engine.machine_id.clone(), vector_clock: engine.vector_clock() };
    let hello_url = format!("{}/sync", peer.base_url);
    let http_response = engine
        .http_client()
        .post(&hello_url)
        .json(&hello)
        .send()
        .await
        .map_err(|e| fabric_protocol::FabricError::PeerUnreachable(e.to_string()))?;
    let response: SyncResponse = http_response
        .json()
        .await
        .map_err(|e| fabric_protocol::FabricError::PeerUnreachable(format!("malformed sync response: {e}")))?;

    let ack = match response {
        SyncResponse::Batch(batch) => engine.apply_batch(batch).await?,
        SyncResponse::FullResyncRequired(resync) => {
            warn!(peer = %peer.machine_id, machine = %resync.machine_id, "full resync required, pulling snapshot");
            pull_full_snapshot(engine, peer).await?
        }
    };

    let ack_url = format!("{}/sync/ack", peer.base_url);
    // Best-effort: a lost ack just means the peer resends the same records
    // next round, which is safe because apply is idempotent.
    if let Err(e) = engine.http_client().post(&ack_url).json(&ack).send().await {
        warn!(peer = %peer.machine_id, error = %e, "sync ack delivery failed, will resend next round");
    }
    Ok(ack)
}

async fn pull_full_snapshot(engine: &SyncEngine, peer: &PeerConfig) -> FabricResult<SyncAck> {
    let snapshot_url = format!("{}/sync/snapshot", peer.base_url);
    let http_response = engine
        .http_client()
        .get(&snapshot_url)
        .send()
        .await
        .map_err(|e| fabric_protocol::FabricError::PeerUnreachable(e.to_string()))?;
    let items: Vec<fabric_protocol::MemoryItem> = http_response
        .json()
        .await
        .map_err(|e| fabric_protocol::FabricError::PeerUnreachable(format!("malformed snapshot: {e}")))?;
    engine.apply_snapshot(items).await
}

fn jittered_interval(base: StdDuration) -> StdDuration {
    let jitter_fraction: f64 = rand::thread_rng().gen_range(0.85..1.15);
    StdDuration::from_secs_f64(base.as_secs_f64() * jitter_fraction)
}

/// `T_sync`-jittered round-robin over configured peers.
pub fn spawn_sync_loop(engine: Arc<SyncEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cursor = AtomicUsize::new(0);
        loop {
            tokio::time::sleep(jittered_interval(engine.config().t_sync)).await;
            let peers = engine.peers();
            if peers.is_empty() {
                continue;
            }
            let index = cursor.fetch_add(1, Ordering::Relaxed) % peers.len();
            let peer = &peers[index];
            match run_round(&engine, peer).await {
                Ok(ack) => info!(peer = %peer.machine_id, clock = ?ack.up_to_vector_clock, "sync round complete"),
                Err(e) => warn!(peer = %peer.machine_id, error = %e, "sync round failed, will retry next cycle"),
            }
        }
    })
}
