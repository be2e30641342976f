//! Cross-machine sync fabric (C7): vector clocks, a local write log, and
//! pairwise `SyncHello -> SyncBatch -> SyncAck` rounds over HTTP/JSON.

pub mod clock;
pub mod engine;
pub mod log;
pub mod peer;
pub mod round;
pub mod wire;

pub use clock::VectorClock;
pub use engine::{SyncConfig, SyncEngine};
pub use log::WriteLog;
pub use peer::{eligible_for_peer, PeerConfig};
pub use round::{run_round, spawn_sync_loop};
pub use wire::{FullResyncRequired, LogRecord, SyncAck, SyncBatch, SyncHello, SyncResponse};
