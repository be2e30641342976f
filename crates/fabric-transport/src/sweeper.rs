//! Background idle/timeout/recovery sweep, mirroring the directory's
//! expiry sweeper shape.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionTable;

pub struct SessionTimeouts {
    pub idle_after: Duration,
    pub session_timeout: Duration,
    pub recovery_horizon: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        SessionTimeouts {
            idle_after: Duration::minutes(5),
            session_timeout: Duration::minutes(30),
            recovery_horizon: Duration::minutes(10),
        }
    }
}

pub fn spawn_session_sweeper(
    sessions: Arc<SessionTable>,
    interval: StdDuration,
    timeouts: SessionTimeouts,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let transitioned = sessions.sweep(timeouts.idle_after, timeouts.session_timeout, timeouts.recovery_horizon);
            if transitioned > 0 {
                debug!(transitioned, "session sweep tick applied transitions");
            }
        }
    })
}
