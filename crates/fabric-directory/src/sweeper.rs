//! Background expiry sweep, mirroring the storage engine's retention
//! sweeper task shape.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::directory::AgentDirectory;

pub fn spawn_expiry_sweeper(directory: Arc<AgentDirectory>, interval: StdDuration, retention_horizon: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let transitioned = directory.expire_sweep(Utc::now(), retention_horizon);
            if transitioned > 0 {
                debug!(transitioned, "agent directory sweep tick applied transitions");
            }
        }
    })
}
