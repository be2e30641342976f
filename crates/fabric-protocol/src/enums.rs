//! Closed enumerations shared across the fabric's components.

use serde::{Deserialize, Serialize};

/// Governs retention, broadcast defaults, and index partition for a
/// [`crate::MemoryItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Global,
    Project,
    Infrastructure,
    Incidents,
    Deployments,
    Monitoring,
    Runbooks,
    Security,
    Agent,
    RuleAudit,
}

impl Category {
    /// Audit writes never get deduplicated and incidents always broadcast
    /// regardless of requested scope, per the category-specific rules in
    /// the memory service's store contract.
    pub fn is_audit(self) -> bool {
        matches!(self, Category::RuleAudit)
    }

    pub fn always_broadcasts(self) -> bool {
        matches!(self, Category::Incidents)
    }
}

/// Controls replication of a [`crate::MemoryItem`] by the sync fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Local,
    Machine,
    Project,
    NetworkShared,
}

impl Scope {
    /// Whether an item at this scope is eligible for cross-machine
    /// replication by the sync fabric.
    pub fn replicates(self) -> bool {
        matches!(self, Scope::Project | Scope::NetworkShared)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Broadcast,
    Delegate,
    Status,
}

/// Per-target delivery outcome tracked on a [`crate::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivered,
    Acknowledged,
    Failed,
    PendingNoAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Global,
    Project,
    Machine,
    Agent,
    Session,
}

impl RuleScope {
    /// Specificity ordering used as the second sort key in rule
    /// evaluation: more specific scopes win ties over less specific ones.
    pub fn specificity(self) -> u8 {
        match self {
            RuleScope::Global => 0,
            RuleScope::Project => 1,
            RuleScope::Machine => 2,
            RuleScope::Agent => 3,
            RuleScope::Session => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Inactive,
    Testing,
    Deprecated,
}

/// How the rule engine resolves two active rules that both match and
/// disagree on outcome for the same tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    HighestPriority,
    MostSpecific,
    LatestCreated,
    Consensus,
    Override,
}

impl Default for ConflictResolution {
    fn default() -> Self {
        ConflictResolution::HighestPriority
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentHealth {
    Healthy,
    Degraded,
    Unresponsive,
}

/// `unknown -> registered -> active -> idle -> offline -> purged`, per the
/// agent directory's lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentLifecycleState {
    Unknown,
    Registered,
    Active,
    Idle,
    Offline,
    Purged,
}

impl AgentLifecycleState {
    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: AgentLifecycleState) -> bool {
        use AgentLifecycleState::*;
        matches!(
            (self, next),
            (Unknown, Registered)
                | (Registered, Active)
                | (Registered, Idle)
                | (Registered, Offline)
                | (Registered, Purged)
                | (Active, Idle)
                | (Idle, Active)
                | (Active, Offline)
                | (Idle, Offline)
                | (Offline, Active)
                | (Offline, Purged)
        )
    }
}

/// `init -> open -> idle -> closing -> closed`, per the MCP transport's
/// session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Init,
    Open,
    Idle,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, Open)
                | (Open, Idle)
                | (Idle, Open)
                | (Open, Closing)
                | (Idle, Closing)
                | (Closing, Closed)
        )
    }
}
