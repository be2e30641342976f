//! Public entry point: collect, sort, and evaluate rules for one
//! invocation, timing the pass for the audit record.

use std::sync::Arc;
use std::time::Instant;

use fabric_protocol::{InvocationContext, Rule, RuleScope};
use tracing::instrument;

use crate::evaluate::{evaluate, EvaluationResult};
use crate::store::RuleStore;

pub struct RuleEngine {
    store: Arc<RuleStore>,
}

/// `{applied_rule_ids, resulting_decisions, duration_ms}`, ready to be
/// written as a `category=rule-audit` memory by the caller.
#[derive(Debug, Clone)]
pub struct RuleAuditRecord {
    pub applied_rule_ids: Vec<String>,
    pub resulting_decisions: serde_json::Value,
    pub duration_ms: u64,
}

impl RuleEngine {
    pub fn new(store: Arc<RuleStore>) -> Self {
        RuleEngine { store }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    #[instrument(skip(self, context), fields(tool_name = %context.tool_name))]
    pub async fn apply(&self, context: &InvocationContext) -> (EvaluationResult, RuleAuditRecord) {
        let started = Instant::now();

        let mut candidates = Vec::new();
        for rule in self.store.all_active().await {
            if !rule.is_effective_at(context.time) {
                continue;
            }
            if self.scope_matches(&rule, context).await {
                candidates.push(rule);
            }
        }
        candidates.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let result = evaluate(&candidates, context);
        let duration_ms = started.elapsed().as_millis() as u64;
        let audit = RuleAuditRecord {
            applied_rule_ids: result.applied_rule_ids.clone(),
            resulting_decisions: serde_json::to_value(&result.resulting_decisions).unwrap_or_default(),
            duration_ms,
        };
        (result, audit)
    }

    /// Global and project-scoped rules apply broadly; machine/agent/session
    /// scoped rules apply only when explicitly bound via a `RuleAssignment`
    /// matching the invocation's identifiers.
    async fn scope_matches(&self, rule: &Rule, context: &InvocationContext) -> bool {
        match rule.scope {
            RuleScope::Global | RuleScope::Project => true,
            RuleScope::Machine => self.bound_to(rule, context.machine_id.as_str()).await,
            RuleScope::Agent => self.bound_to(rule, context.agent_id.as_str()).await,
            RuleScope::Session => self.bound_to(rule, context.session_id.as_str()).await,
        }
    }

    async fn bound_to(&self, rule: &Rule, scope_id: &str) -> bool {
        self.store
            .assignments_for_rule(&rule.rule_id)
            .await
            .iter()
            .any(|a| a.scope_id == scope_id)
    }
}
