//! Coordination bus (C6): broadcast, delegation, and query primitives for
//! cooperating agents, built on top of the agent directory (C5).

pub mod bus;
pub mod delivery;
pub mod inbox;
pub mod retry;

pub use bus::{CoordinationBus, DelegationStatus};
pub use delivery::{attempts_exhausted, next_retry_at, MAX_ATTEMPTS, MAX_WINDOW};
pub use inbox::InboxTable;
pub use retry::spawn_delivery_retry_loop;
