//! Canonical wire and domain types shared by every fabric component.
//!
//! This crate has no async runtime dependency and no I/O: it defines the
//! identifiers, enums, and records that `fabric-storage`, `fabric-vector`,
//! `fabric-memory`, `fabric-rules`, `fabric-directory`,
//! `fabric-coordination`, `fabric-sync`, `fabric-transport`, and
//! `fabric-tools` all speak.

pub mod agent;
pub mod context;
pub mod enums;
pub mod error;
pub mod ids;
pub mod memory;
pub mod message;
pub mod rule;
pub mod session;

pub use agent::Agent;
pub use context::InvocationContext;
pub use enums::{
    AgentHealth, AgentLifecycleState, Category, ConflictResolution, DeliveryState, MessageKind,
    RuleScope, RuleStatus, Scope, SessionState, Severity,
};
pub use error::{ErrorOutcome, FabricError, FabricResult};
pub use ids::{AgentId, ApprovalId, DelegationId, MachineId, MemoryId, MessageId, RuleId, SessionId};
pub use memory::{EmbeddingRecord, MemoryItem};
pub use message::{Message, TargetSelector};
pub use rule::{
    Action, Condition, ConditionOp, DependencyKind, Rule, RuleAssignment, RuleChangeRecord,
    RuleDependency,
};
pub use session::{AuthorizedRoles, PendingCall, Session};
