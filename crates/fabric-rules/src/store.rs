//! Versioned rule registry with activation-time dependency validation.

use std::collections::{HashMap, HashSet};

use fabric_protocol::{DependencyKind, FabricError, FabricResult, Rule, RuleAssignment, RuleId, RuleStatus};
use tokio::sync::RwLock;
use tracing::instrument;

pub struct RuleStore {
    rules: RwLock<HashMap<RuleId, Rule>>,
    assignments: RwLock<Vec<RuleAssignment>>,
}

impl RuleStore {
    pub fn new() -> Self {
        RuleStore { rules: RwLock::new(HashMap::new()), assignments: RwLock::new(Vec::new()) }
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.rule_id))]
    pub async fn activate(&self, rule: Rule) -> FabricResult<Rule> {
        if rule.status == RuleStatus::Active {
            let rules = self.rules.read().await;
            self.validate_dependencies(&rules, &rule)?;
            self.reject_cycles(&rules, &rule)?;
        }
        let mut rules = self.rules.write().await;
        rules.insert(rule.rule_id.clone(), rule.clone());
        Ok(rule)
    }

    /// Create a new version of an existing rule, carrying a change record.
    #[instrument(skip(self, mutate), fields(rule_id = %rule_id))]
    pub async fn update<F>(&self, rule_id: &RuleId, mutate: F) -> FabricResult<Rule>
    where
        F: FnOnce(&mut Rule),
    {
        let current = {
            let rules = self.rules.read().await;
            rules.get(rule_id).cloned().ok_or_else(|| FabricError::NotFound(rule_id.to_string()))?
        };
        let mut next = current.clone();
        next.version += 1;
        mutate(&mut next);
        self.activate(next).await
    }

    pub async fn get(&self, rule_id: &RuleId) -> Option<Rule> {
        self.rules.read().await.get(rule_id).cloned()
    }

    pub async fn all_active(&self) -> Vec<Rule> {
        self.rules
            .read()
            .await
            .values()
            .filter(|r| r.status == RuleStatus::Active)
            .cloned()
            .collect()
    }

    pub async fn assign(&self, assignment: RuleAssignment) {
        self.assignments.write().await.push(assignment);
    }

    pub async fn assignments_for_rule(&self, rule_id: &RuleId) -> Vec<RuleAssignment> {
        self.assignments
            .read()
            .await
            .iter()
            .filter(|a| &a.rule_id == rule_id)
            .cloned()
            .collect()
    }

    fn validate_dependencies(&self, rules: &HashMap<RuleId, Rule>, rule: &Rule) -> FabricResult<()> {
        for dep in &rule.dependencies {
            match dep.kind {
                DependencyKind::Requires => {
                    let satisfied = rules
                        .get(&dep.rule_id)
                        .map(|r| r.status == RuleStatus::Active)
                        .unwrap_or(false);
                    if !satisfied {
                        return Err(FabricError::UnmetDependency {
                            rule_id: rule.rule_id.to_string(),
                            requires: dep.rule_id.to_string(),
                        });
                    }
                }
                DependencyKind::Conflicts => {
                    let conflicting_active = rules
                        .get(&dep.rule_id)
                        .map(|r| r.status == RuleStatus::Active)
                        .unwrap_or(false);
                    if conflicting_active {
                        return Err(FabricError::UnmetDependency {
                            rule_id: rule.rule_id.to_string(),
                            requires: format!("not({})", dep.rule_id),
                        });
                    }
                }
                DependencyKind::Enhances | DependencyKind::Replaces => {}
            }
        }
        Ok(())
    }

    /// Depth-first search over `requires` edges, including `rule` as if it
    /// were already inserted, to detect cycles before committing.
    fn reject_cycles(&self, rules: &HashMap<RuleId, Rule>, rule: &Rule) -> FabricResult<()> {
        let mut graph: HashMap<RuleId, Vec<RuleId>> = rules
            .values()
            .map(|r| {
                let edges = r
                    .dependencies
                    .iter()
                    .filter(|d| d.kind == DependencyKind::Requires)
                    .map(|d| d.rule_id.clone())
                    .collect();
                (r.rule_id.clone(), edges)
            })
            .collect();
        graph.insert(
            rule.rule_id.clone(),
            rule.dependencies
                .iter()
                .filter(|d| d.kind == DependencyKind::Requires)
                .map(|d| d.rule_id.clone())
                .collect(),
        );

        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        if has_cycle(&graph, &rule.rule_id, &mut visiting, &mut visited) {
            return Err(FabricError::DependencyCycle(rule.rule_id.to_string()));
        }
        Ok(())
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn has_cycle(
    graph: &HashMap<RuleId, Vec<RuleId>>,
    node: &RuleId,
    visiting: &mut HashSet<RuleId>,
    visited: &mut HashSet<RuleId>,
) -> bool {
    if visited.contains(node) {
        return false;
    }
    if !visiting.insert(node.clone()) {
        return true;
    }
    if let Some(edges) = graph.get(node) {
        for next in edges {
            if has_cycle(graph, next, visiting, visited) {
                return true;
            }
        }
    }
    visiting.remove(node);
    visited.insert(node.clone());
    false
}
