//! Error taxonomy for the fabric.
//!
//! Each component surfaces its own stable error type; composing layers
//! translate only where semantics change (e.g. the memory service maps
//! `EmbeddingFailed` into `vector_pending=true` rather than propagating it).
//! No exception ever crosses an inter-machine boundary: peer errors become
//! `SyncError` records instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The full taxonomy of `spec.md` §7, as a closed enum.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum FabricError {
    // ── Input errors: surfaced to caller, never retried automatically ──
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("version conflict: expected > {stored}, got {attempted}")]
    VersionConflict { stored: u64, attempted: u64 },
    #[error("unmet dependency: rule {rule_id} requires {requires}")]
    UnmetDependency { rule_id: String, requires: String },
    #[error("rule violation: rule={rule_id} reason={reason}")]
    RuleViolation { rule_id: String, reason: String },
    #[error("rule conflict on field {field}: rules {rule_ids:?} disagree under consensus")]
    RuleConflict { field: String, rule_ids: Vec<String> },
    #[error("cycle detected in rule dependency graph: {0}")]
    DependencyCycle(String),

    // ── Authorization errors: surfaced, audited ──
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),

    // ── Resource errors: surfaced, emit an incidents memory ──
    #[error("quota exceeded for category {0}")]
    QuotaExceeded(String),
    #[error("inbox overflow for agent {0}")]
    InboxOverflow(String),
    #[error("record too large: {size_bytes} bytes exceeds 1 MiB")]
    RecordTooLarge { size_bytes: u64 },

    // ── Transient errors: retried locally with backoff ──
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
    #[error("operation deadline expired")]
    Timeout,

    // ── Transport errors: terminate the current call ──
    #[error("session expired")]
    SessionExpired,
    #[error("call timed out")]
    CallTimeout,
    #[error("cancelled")]
    Cancelled,

    // ── Fatal errors: process logs, emits a security memory, terminates ──
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("corrupted storage: {0}")]
    CorruptedStorage(String),

    // ── Generic not-found, used by several components ──
    #[error("not found: {0}")]
    NotFound(String),
}

impl FabricError {
    /// Whether a client encountering this error is expected to retry with
    /// backoff, per the user-visible behavior contract in `spec.md` §7.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            FabricError::StorageUnavailable(_)
                | FabricError::PeerUnreachable(_)
                | FabricError::EmbeddingFailed(_)
                | FabricError::Timeout
        )
    }

    /// Stable machine-readable kind string for the `{kind, detail,
    /// retriable}` structured error every tool returns.
    pub fn kind(&self) -> &'static str {
        match self {
            FabricError::InvalidParameters(_) => "InvalidParameters",
            FabricError::InvalidCategory(_) => "InvalidCategory",
            FabricError::VersionConflict { .. } => "VersionConflict",
            FabricError::UnmetDependency { .. } => "UnmetDependency",
            FabricError::RuleViolation { .. } => "RuleViolation",
            FabricError::RuleConflict { .. } => "RuleConflict",
            FabricError::DependencyCycle(_) => "DependencyCycle",
            FabricError::Unauthorized => "Unauthorized",
            FabricError::Forbidden(_) => "Forbidden",
            FabricError::QuotaExceeded(_) => "QuotaExceeded",
            FabricError::InboxOverflow(_) => "InboxOverflow",
            FabricError::RecordTooLarge { .. } => "RecordTooLarge",
            FabricError::StorageUnavailable(_) => "StorageUnavailable",
            FabricError::PeerUnreachable(_) => "PeerUnreachable",
            FabricError::EmbeddingFailed(_) => "EmbeddingFailed",
            FabricError::Timeout => "Timeout",
            FabricError::SessionExpired => "SessionExpired",
            FabricError::CallTimeout => "CallTimeout",
            FabricError::Cancelled => "Cancelled",
            FabricError::InvariantViolation(_) => "InvariantViolation",
            FabricError::CorruptedStorage(_) => "CorruptedStorage",
            FabricError::NotFound(_) => "NotFound",
        }
    }

    /// Project into the wire shape every tool call returns on failure.
    pub fn to_outcome(&self) -> ErrorOutcome {
        ErrorOutcome {
            kind: self.kind().to_owned(),
            detail: self.to_string(),
            retriable: self.retriable(),
        }
    }
}

/// The structured error every tool call returns on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorOutcome {
    pub kind: String,
    pub detail: String,
    pub retriable: bool,
}

/// Convenience result type for fabric operations.
pub type FabricResult<T> = Result<T, FabricError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retriable() {
        assert!(FabricError::StorageUnavailable("disk full".into()).retriable());
        assert!(FabricError::Timeout.retriable());
    }

    #[test]
    fn input_errors_are_not_retriable() {
        assert!(!FabricError::InvalidParameters("bad".into()).retriable());
        assert!(!FabricError::RuleViolation {
            rule_id: "r1".into(),
            reason: "aws_key_detected".into()
        }
        .retriable());
    }

    #[test]
    fn to_outcome_carries_kind_and_retriable() {
        let err = FabricError::VersionConflict {
            stored: 3,
            attempted: 2,
        };
        let outcome = err.to_outcome();
        assert_eq!(outcome.kind, "VersionConflict");
        assert!(!outcome.retriable);
    }

    #[test]
    fn error_outcome_serde_roundtrip() {
        let outcome = ErrorOutcome {
            kind: "Timeout".into(),
            detail: "deadline expired".into(),
            retriable: true,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: ErrorOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
    }
}
