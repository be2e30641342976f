//! Background tombstone sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::engine::StorageEngine;

/// Runs `sweep_expired_tombstones` on a fixed interval until the returned
/// handle is aborted. `fabricd` and `fabric-gateway` both own one of these
/// for the lifetime of the process.
pub fn spawn_retention_sweeper(engine: Arc<dyn StorageEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match engine.sweep_expired_tombstones().await {
                Ok(swept) if swept > 0 => info!(swept, "retention sweep removed expired tombstones"),
                Ok(_) => {}
                Err(error) => error!(%error, "retention sweep failed"),
            }
        }
    })
}
