//! Rule engine domain types: conditions, actions, and the `Rule` record
//! itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{ConflictResolution, RuleScope, RuleStatus};
use crate::ids::RuleId;

/// A single predicate evaluated against an `InvocationContext` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Ne,
    Matches,
    NotMatches,
    In,
    Gt,
    Lt,
}

/// An effect a rule applies to the invocation once its conditions match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Set { field: String, value: Value },
    Append { field: String, value: Value },
    /// `predicate` is evaluated against the would-be output; failure
    /// produces a `RuleViolation` tagged with `reason`.
    Validate { predicate: Condition, reason: String },
    /// Halts the invocation outright; short-circuits remaining actions.
    Block { reason: String },
    Transform { field: String, rewriter: String },
}

impl Action {
    /// The field this action targets, for conflict-resolution grouping.
    /// `Block` targets no field: it is applied unconditionally and halts.
    pub fn target_field(&self) -> Option<&str> {
        match self {
            Action::Set { field, .. } | Action::Append { field, .. } | Action::Transform { field, .. } => {
                Some(field)
            }
            Action::Validate { .. } | Action::Block { .. } => None,
        }
    }
}

/// A dependency edge from one rule to another, validated for cycles at
/// activation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Requires,
    Conflicts,
    Enhances,
    Replaces,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDependency {
    pub kind: DependencyKind,
    pub rule_id: RuleId,
}

/// `{change_type, changed_by, reason}` recorded on every new rule version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleChangeRecord {
    pub change_type: String,
    pub changed_by: crate::ids::AgentId,
    pub reason: String,
}

/// Governance rule. Versioned like `MemoryItem`, owned exclusively by the
/// rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: RuleId,
    pub name: String,
    pub r#type: String,
    pub scope: RuleScope,
    pub priority: i64,
    pub status: RuleStatus,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub parent_rule_id: Option<RuleId>,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub version: u64,
    pub conflict_resolution: ConflictResolution,
    pub dependencies: Vec<RuleDependency>,
    pub change_record: Option<RuleChangeRecord>,
}

impl Rule {
    pub fn is_effective_at(&self, time: DateTime<Utc>) -> bool {
        self.status == RuleStatus::Active
            && self.effective_from <= time
            && self.effective_until.map(|until| time < until).unwrap_or(true)
    }

    /// `(priority desc, scope specificity desc, version asc, rule_id asc)`
    /// as a single ascending sort key: negate the descending fields.
    pub fn sort_key(&self) -> (i64, i64, u64, &str) {
        (
            -self.priority,
            -(self.scope.specificity() as i64),
            self.version,
            self.rule_id.as_str(),
        )
    }
}

/// `{rule_id, scope_type, scope_id, priority_override, effective_from,
/// effective_until}` — binds a rule into a narrower scope than its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAssignment {
    pub rule_id: RuleId,
    pub scope_type: RuleScope,
    pub scope_id: String,
    pub priority_override: Option<i64>,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule(priority: i64, scope: RuleScope, version: u64, rule_id: &str) -> Rule {
        Rule {
            rule_id: RuleId::from_string(rule_id),
            name: "test".into(),
            r#type: "security".into(),
            scope,
            priority,
            status: RuleStatus::Active,
            conditions: vec![],
            actions: vec![],
            parent_rule_id: None,
            effective_from: Utc::now() - chrono::Duration::days(1),
            effective_until: None,
            version,
            conflict_resolution: ConflictResolution::default(),
            dependencies: vec![],
            change_record: None,
        }
    }

    #[test]
    fn is_effective_at_respects_window() {
        let mut rule = sample_rule(100, RuleScope::Global, 1, "r1");
        assert!(rule.is_effective_at(Utc::now()));
        rule.status = RuleStatus::Inactive;
        assert!(!rule.is_effective_at(Utc::now()));
    }

    #[test]
    fn sort_key_orders_higher_priority_first() {
        let high = sample_rule(1000, RuleScope::Global, 1, "r1");
        let low = sample_rule(10, RuleScope::Global, 1, "r2");
        assert!(high.sort_key() < low.sort_key());
    }

    #[test]
    fn sort_key_breaks_priority_ties_by_specificity_then_version_then_id() {
        let global = sample_rule(500, RuleScope::Global, 1, "r1");
        let session = sample_rule(500, RuleScope::Session, 1, "r1");
        assert!(session.sort_key() < global.sort_key());
    }

    #[test]
    fn block_action_targets_no_field() {
        let action = Action::Block { reason: "aws_key_detected".into() };
        assert_eq!(action.target_field(), None);
    }
}
