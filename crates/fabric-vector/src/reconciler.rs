//! Background reconciler for the C1/C2 alignment contract.
//!
//! A `MemoryItem` written with `vector_pending=true` means the embedding
//! step of the two-step write failed; this task retries the embedding and
//! upsert until it succeeds, then clears the flag on the stored item.

use std::sync::Arc;
use std::time::Duration;

use fabric_protocol::{FabricError, MemoryItem};
use fabric_storage::{ScanFilter, StorageEngine};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::VectorIndex;

/// Produces an embedding vector for a `MemoryItem`'s content. Implemented
/// outside this crate; the reconciler and the memory service share the
/// same trait so either can drive a retry.
#[async_trait::async_trait]
pub trait EmbeddingFn: Send + Sync {
    async fn embed(&self, content: &str) -> Result<Vec<f32>, FabricError>;
}

pub fn spawn_reconciler(
    storage: Arc<dyn StorageEngine>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingFn>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(error) = reconcile_once(&storage, &vector_index, &embedder).await {
                error!(%error, "vector reconciler pass failed");
            }
        }
    })
}

async fn reconcile_once(
    storage: &Arc<dyn StorageEngine>,
    vector_index: &Arc<dyn VectorIndex>,
    embedder: &Arc<dyn EmbeddingFn>,
) -> Result<(), FabricError> {
    let pending: Vec<MemoryItem> = storage
        .scan(ScanFilter { include_tombstones: false, ..ScanFilter::default() })
        .await?
        .into_iter()
        .filter(|item| item.vector_pending)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }
    info!(count = pending.len(), "reconciling pending embeddings");

    for mut item in pending {
        match embedder.embed(&item.content).await {
            Ok(vector) => {
                vector_index.upsert(item.id.clone(), item.version, vector).await?;
                item.vector_pending = false;
                item.version += 1;
                if let Err(e) = storage.put(item).await {
                    warn!(error = %e, "failed to clear vector_pending flag after reconciliation");
                }
            }
            Err(e) => warn!(error = %e, "embedding retry failed, will retry next pass"),
        }
    }
    Ok(())
}
