//! Agent directory (C5): registry of live agents, capabilities, health,
//! and TTL-driven lifecycle, feeding the coordination bus's routing.

pub mod directory;
pub mod sweeper;

pub use directory::{AgentDirectory, AgentFilter, LifecycleTransition};
pub use sweeper::spawn_expiry_sweeper;
