//! Background task that walks due deliveries and retries them, mirroring
//! the storage engine's tombstone sweeper and the directory's expiry
//! sweeper.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::bus::CoordinationBus;

pub fn spawn_delivery_retry_loop(bus: Arc<CoordinationBus>, interval: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            debug!("coordination bus retrying due deliveries");
            bus.retry_due_deliveries();
        }
    })
}
