//! Durable record store keyed by id (C1): version-checked writes,
//! secondary indices, and background tombstone retention.

pub mod config;
pub mod engine;
pub mod index;
pub mod retention;

pub use config::{StorageConfig, MAX_RECORD_BYTES};
pub use engine::{FileStorageEngine, ScanFilter, StorageEngine, StorageStats};
pub use retention::spawn_retention_sweeper;
