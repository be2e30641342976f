//! `FabricToolDispatcher`, grounded on `aios-tools::ToolDispatcher`'s
//! registry + capability-check + dispatch shape: every call passes
//! through C4 first, dispatches to C3/C5/C6/C7, then emits an audit
//! `MemoryItem` via C3, exactly as the tool surface's closing contract.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use fabric_coordination::{CoordinationBus, DelegationStatus};
use fabric_directory::{AgentDirectory, AgentFilter};
use fabric_memory::{BulkOp, MemoryService, SearchFilter};
use fabric_protocol::{
    AgentHealth, AgentId, AgentLifecycleState, Category, DelegationId, FabricError, FabricResult,
    InvocationContext, MachineId, MemoryId, MessageId, Scope, Severity, TargetSelector,
};
use fabric_rules::RuleEngine;
use fabric_sync::SyncEngine;
use fabric_transport::dispatch::{ToolDispatcher, ToolOutcome};
use indexmap::IndexSet;
use serde_json::{json, Value};
use tracing::warn;

use crate::params::{optional_i64, optional_str, optional_u64, require_str, string_list};
use crate::registry::{FabricToolKind, ToolRegistry};

pub struct FabricToolDispatcher {
    memory: Arc<MemoryService>,
    directory: Arc<AgentDirectory>,
    bus: Arc<CoordinationBus>,
    rules: Arc<RuleEngine>,
    sync: Arc<SyncEngine>,
    registry: Arc<ToolRegistry>,
    machine_id: MachineId,
}

impl FabricToolDispatcher {
    pub fn new(
        memory: Arc<MemoryService>,
        directory: Arc<AgentDirectory>,
        bus: Arc<CoordinationBus>,
        rules: Arc<RuleEngine>,
        sync: Arc<SyncEngine>,
        machine_id: MachineId,
    ) -> Self {
        FabricToolDispatcher {
            memory,
            directory,
            bus,
            rules,
            sync,
            registry: Arc::new(ToolRegistry::with_core_tools()),
            machine_id,
        }
    }

    async fn emit_audit(&self, context: &InvocationContext, outcome: &Result<Value, FabricError>, duration_ms: u64) {
        let category = audit_category(&context.tool_name);
        let parameters_digest = digest(&context.parameters);
        let outcome_field = match outcome {
            Ok(_) => json!({"ok": true}),
            Err(e) => json!({"ok": false, "kind": e.kind(), "detail": e.to_string()}),
        };
        let content = json!({
            "caller": context.agent_id.as_str(),
            "tool_name": context.tool_name,
            "parameters_digest": parameters_digest,
            "outcome": outcome_field,
            "duration_ms": duration_ms,
        })
        .to_string();

        let mut tags = IndexSet::new();
        tags.insert(context.tool_name.clone());
        let result = self
            .memory
            .store(
                content,
                category,
                tags,
                Some(context.session_id.as_str().to_owned()),
                Scope::Machine,
                self.machine_id.clone(),
                context.agent_id.clone(),
            )
            .await;
        if let Err(e) = result {
            warn!(tool_name = %context.tool_name, error = %e, "failed to write audit memory");
        }
    }

    async fn run_tool(&self, context: &InvocationContext, kind: FabricToolKind, parameters: &Value) -> FabricResult<Value> {
        use FabricToolKind::*;
        match kind {
            StoreMemory => self.store_memory(context, parameters).await,
            RetrieveMemory => self.retrieve_memory(parameters).await,
            SearchMemories => self.search_memories(parameters).await,
            DeleteMemory => self.delete_memory(context, parameters).await,
            BulkDeleteMemories => self.bulk_delete_memories(context, parameters).await,
            RegisterAgent => self.register_agent(context, parameters),
            Heartbeat => self.heartbeat(context, parameters),
            ListAgents => self.list_agents(parameters),
            GetAgentStatus => self.get_agent_status(context, parameters),
            BroadcastDiscovery => self.broadcast_discovery(context, parameters),
            DelegateTask => self.delegate_task(parameters),
            CancelDelegation => self.cancel_delegation(context, parameters),
            AcknowledgeMessage => self.acknowledge_message(context, parameters),
            QueryCollective => self.query_collective(context, parameters).await,
            SyncStatus => self.sync_status(),
            ForceSync => self.force_sync(parameters).await,
            GetFormatGuide => self.get_format_guide(),
            GetMemoryAccessStats => self.get_memory_access_stats().await,
        }
    }

    async fn store_memory(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let content = require_str(parameters, "content")?.to_owned();
        let category = parse_category(optional_str(parameters, "category").unwrap_or("project"))?;
        let tags: IndexSet<String> = string_list(parameters, "tags").into_iter().collect();
        let item_context = optional_str(parameters, "context").map(str::to_owned);
        let scope = match optional_str(parameters, "scope") {
            Some(s) => parse_scope(s)?,
            None => Scope::Machine,
        };
        let id = self
            .memory
            .store(content, category, tags, item_context, scope, self.machine_id.clone(), context.agent_id.clone())
            .await?;
        Ok(json!({"id": id.as_str()}))
    }

    async fn retrieve_memory(&self, parameters: &Value) -> FabricResult<Value> {
        let id = MemoryId::from_string(require_str(parameters, "id")?);
        let item = self.memory.retrieve(&id).await?;
        Ok(serde_json::to_value(item).unwrap_or(Value::Null))
    }

    async fn search_memories(&self, parameters: &Value) -> FabricResult<Value> {
        let query = require_str(parameters, "query")?;
        let filter = SearchFilter {
            category: optional_str(parameters, "category").map(parse_category).transpose()?,
            tag: optional_str(parameters, "tag").map(str::to_owned),
        };
        let k = optional_u64(parameters, "k").unwrap_or(10) as usize;
        let ranked = self.memory.search(query, filter, k).await?;
        let results: Vec<Value> = ranked
            .into_iter()
            .map(|r| json!({"item": r.item, "score": r.score}))
            .collect();
        Ok(json!({"results": results}))
    }

    async fn delete_memory(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let id = MemoryId::from_string(require_str(parameters, "id")?);
        let reason = optional_str(parameters, "reason").unwrap_or("unspecified").to_owned();
        self.memory.delete(&id, reason, self.machine_id.clone(), context.agent_id.clone()).await?;
        Ok(json!({"id": id.as_str(), "tombstoned": true}))
    }

    async fn bulk_delete_memories(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let ids: Vec<MemoryId> = string_list(parameters, "ids").into_iter().map(MemoryId::from_string).collect();
        let reason = optional_str(parameters, "reason").unwrap_or("unspecified").to_owned();
        let outcomes = self
            .memory
            .bulk(BulkOp::Delete { reason }, ids, self.machine_id.clone(), context.agent_id.clone())
            .await;
        let results: Vec<Value> = outcomes
            .into_iter()
            .map(|o| match o.result {
                Ok(()) => json!({"id": o.id.as_str(), "ok": true}),
                Err(e) => json!({"id": o.id.as_str(), "ok": false, "error": e}),
            })
            .collect();
        Ok(json!({"results": results}))
    }

    fn register_agent(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let agent_id = optional_str(parameters, "agent_id").map(AgentId::from_string).unwrap_or_else(|| context.agent_id.clone());
        let roles: IndexSet<String> = string_list(parameters, "roles").into_iter().collect();
        let capabilities: IndexSet<String> = string_list(parameters, "capabilities").into_iter().collect();
        self.directory.register(agent_id.clone(), context.machine_id.clone(), roles, capabilities);
        Ok(json!({"agent_id": agent_id.as_str()}))
    }

    fn heartbeat(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let health = match optional_str(parameters, "health") {
            Some("degraded") => AgentHealth::Degraded,
            Some("unresponsive") => AgentHealth::Unresponsive,
            _ => AgentHealth::Healthy,
        };
        self.directory.heartbeat(&context.agent_id, health)?;
        Ok(json!({"agent_id": context.agent_id.as_str(), "health": format!("{health:?}")}))
    }

    fn list_agents(&self, parameters: &Value) -> FabricResult<Value> {
        let filter = AgentFilter {
            role: optional_str(parameters, "role").map(str::to_owned),
            capability: optional_str(parameters, "capability").map(str::to_owned),
            lifecycle_state: optional_str(parameters, "lifecycle_state").and_then(parse_lifecycle_state),
        };
        let agents = self.directory.list(filter);
        Ok(json!({"agents": agents}))
    }

    fn get_agent_status(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let agent_id = optional_str(parameters, "agent_id").map(AgentId::from_string).unwrap_or_else(|| context.agent_id.clone());
        let agent = self.directory.status(&agent_id)?;
        Ok(serde_json::to_value(agent).unwrap_or(Value::Null))
    }

    fn broadcast_discovery(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let payload = parameters.get("payload").cloned().unwrap_or(Value::Null);
        let category = optional_str(parameters, "category").map(parse_category).transpose()?.unwrap_or(Category::Agent);
        let severity = optional_str(parameters, "severity").map(parse_severity).unwrap_or(Severity::Info);
        let target = parse_target_selector(parameters);
        let message_id = self.bus.broadcast(context.agent_id.clone(), payload, category, severity, target)?;
        Ok(json!({"message_id": message_id.as_str()}))
    }

    fn delegate_task(&self, parameters: &Value) -> FabricResult<Value> {
        let required_capabilities = string_list(parameters, "required_capabilities");
        let priority = optional_i64(parameters, "priority").unwrap_or(0);
        let (delegation_id, status) = self.bus.delegate(required_capabilities, priority, None);
        let status_field = match status {
            DelegationStatus::Assigned(agent_id) => json!({"status": "assigned", "assigned_agent": agent_id.as_str()}),
            DelegationStatus::PendingNoAgent => json!({"status": "pending_no_agent"}),
        };
        Ok(json!({"delegation_id": delegation_id.as_str(), "result": status_field}))
    }

    fn cancel_delegation(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let delegation_id = DelegationId::from_string(require_str(parameters, "delegation_id")?);
        self.bus.cancel_delegation(context.agent_id.clone(), &delegation_id)?;
        Ok(json!({"delegation_id": delegation_id.as_str(), "cancelled": true}))
    }

    fn acknowledge_message(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let message_id = MessageId::from_string(require_str(parameters, "message_id")?);
        self.bus.acknowledge(&context.agent_id, &message_id)?;
        Ok(json!({"message_id": message_id.as_str(), "acknowledged": true}))
    }

    async fn query_collective(&self, context: &InvocationContext, parameters: &Value) -> FabricResult<Value> {
        let question = parameters.get("question").cloned().unwrap_or(Value::Null);
        let category = optional_str(parameters, "category").map(parse_category).transpose()?.unwrap_or(Category::Agent);
        let target = parse_target_selector(parameters);
        let window = StdDuration::from_millis(optional_u64(parameters, "window_ms").unwrap_or(2_000));
        let responses = self.bus.query(context.agent_id.clone(), question, category, target, window).await?;
        Ok(json!({"responses": responses}))
    }

    fn sync_status(&self) -> FabricResult<Value> {
        let clock: Vec<(String, u64)> = self.sync.vector_clock().iter().map(|(m, v)| (m.as_str().to_owned(), *v)).collect();
        Ok(json!({
            "machine_id": self.machine_id.as_str(),
            "vector_clock": clock,
            "catching_up": self.sync.is_catching_up(),
            "peer_count": self.sync.peers().len(),
        }))
    }

    async fn force_sync(&self, parameters: &Value) -> FabricResult<Value> {
        let only_peer = optional_str(parameters, "peer_machine_id");
        let mut acks = Vec::new();
        for peer in self.sync.peers() {
            if only_peer.is_some_and(|m| m != peer.machine_id.as_str()) {
                continue;
            }
            match fabric_sync::run_round(&self.sync, peer).await {
                Ok(ack) => acks.push(json!({"peer": peer.machine_id.as_str(), "ok": true, "up_to": ack.up_to_vector_clock.iter().map(|(m, v)| (m.as_str().to_owned(), *v)).collect::<Vec<_>>()})),
                Err(e) => acks.push(json!({"peer": peer.machine_id.as_str(), "ok": false, "error": e.to_outcome()})),
            }
        }
        Ok(json!({"rounds": acks}))
    }

    fn get_format_guide(&self) -> FabricResult<Value> {
        let tools: Vec<Value> = self
            .registry
            .definitions()
            .map(|d| json!({"name": d.name, "description": d.description}))
            .collect();
        Ok(json!({
            "memory_item_fields": [
                "id", "content", "category", "tags", "context", "scope", "origin_machine",
                "origin_agent", "created_at", "updated_at", "version", "tombstone", "format_version",
            ],
            "categories": ["global", "project", "infrastructure", "incidents", "deployments", "monitoring", "runbooks", "security", "agent", "rule-audit"],
            "scopes": ["local", "machine", "project", "network-shared"],
            "tools": tools,
        }))
    }

    async fn get_memory_access_stats(&self) -> FabricResult<Value> {
        let stats = self.memory.stats().await?;
        Ok(serde_json::to_value(stats).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ToolDispatcher for FabricToolDispatcher {
    async fn dispatch(&self, context: InvocationContext) -> ToolOutcome {
        let started = Instant::now();
        let (evaluation, _rule_audit) = self.rules.apply(&context).await;

        if let Some(reason) = evaluation.blocked {
            let error = FabricError::RuleViolation {
                rule_id: evaluation.applied_rule_ids.last().cloned().unwrap_or_default(),
                reason,
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            self.emit_audit(&context, &Err(error.clone()), duration_ms).await;
            return ToolOutcome::Err(error.to_outcome());
        }
        if let Some(violation) = evaluation.violations.into_iter().next() {
            let duration_ms = started.elapsed().as_millis() as u64;
            self.emit_audit(&context, &Err(violation.clone()), duration_ms).await;
            return ToolOutcome::Err(violation.to_outcome());
        }

        let Some(kind) = FabricToolKind::parse(&context.tool_name) else {
            let error = FabricError::InvalidParameters(format!("unknown tool {}", context.tool_name));
            let duration_ms = started.elapsed().as_millis() as u64;
            self.emit_audit(&context, &Err(error.clone()), duration_ms).await;
            return ToolOutcome::Err(error.to_outcome());
        };

        let mut parameters = context.parameters.clone();
        apply_decisions(&mut parameters, &evaluation.resulting_decisions);

        let result = self.run_tool(&context, kind, &parameters).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        self.emit_audit(&context, &result, duration_ms).await;

        match result {
            Ok(value) => ToolOutcome::Ok(value),
            Err(e) => ToolOutcome::Err(e.to_outcome()),
        }
    }
}

fn audit_category(tool_name: &str) -> Category {
    match tool_name {
        "register_agent" | "heartbeat" | "list_agents" | "get_agent_status" | "broadcast_discovery"
        | "delegate_task" | "cancel_delegation" | "acknowledge_message" | "query_collective" => Category::Agent,
        _ => Category::RuleAudit,
    }
}

fn digest(parameters: &Value) -> String {
    let bytes = serde_json::to_vec(parameters).unwrap_or_default();
    hex::encode(blake3::hash(&bytes).as_bytes())
}

/// Writes `Set`/`Transform` decisions targeting `parameters.<field>` back
/// onto the invocation's parameters before dispatch, mirroring
/// `InvocationContext::field`'s read-side dotted-path navigation.
fn apply_decisions(parameters: &mut Value, decisions: &std::collections::HashMap<String, Value>) {
    for (field, value) in decisions {
        let Some(rest) = field.strip_prefix("parameters.") else { continue };
        if let Value::Object(map) = parameters {
            map.insert(rest.to_owned(), value.clone());
        }
    }
}

fn parse_category(raw: &str) -> FabricResult<Category> {
    match raw {
        "global" => Ok(Category::Global),
        "project" => Ok(Category::Project),
        "infrastructure" => Ok(Category::Infrastructure),
        "incidents" => Ok(Category::Incidents),
        "deployments" => Ok(Category::Deployments),
        "monitoring" => Ok(Category::Monitoring),
        "runbooks" => Ok(Category::Runbooks),
        "security" => Ok(Category::Security),
        "agent" => Ok(Category::Agent),
        "rule-audit" => Ok(Category::RuleAudit),
        other => Err(FabricError::InvalidCategory(other.to_owned())),
    }
}

fn parse_scope(raw: &str) -> FabricResult<Scope> {
    match raw {
        "local" => Ok(Scope::Local),
        "machine" => Ok(Scope::Machine),
        "project" => Ok(Scope::Project),
        "network-shared" => Ok(Scope::NetworkShared),
        other => Err(FabricError::InvalidParameters(format!("unknown scope {other}"))),
    }
}

fn parse_severity(raw: &str) -> Severity {
    match raw {
        "warning" => Severity::Warning,
        "critical" => Severity::Critical,
        _ => Severity::Info,
    }
}

fn parse_lifecycle_state(raw: &str) -> Option<AgentLifecycleState> {
    match raw {
        "registered" => Some(AgentLifecycleState::Registered),
        "active" => Some(AgentLifecycleState::Active),
        "idle" => Some(AgentLifecycleState::Idle),
        "offline" => Some(AgentLifecycleState::Offline),
        "purged" => Some(AgentLifecycleState::Purged),
        _ => None,
    }
}

fn parse_target_selector(parameters: &Value) -> Option<TargetSelector> {
    if let Some(agent_id) = optional_str(parameters, "target_agent") {
        return Some(TargetSelector::Agent { agent_id: AgentId::from_string(agent_id) });
    }
    if let Some(role) = optional_str(parameters, "target_role") {
        return Some(TargetSelector::Role { role: role.to_owned() });
    }
    if let Some(capability) = optional_str(parameters, "target_capability") {
        return Some(TargetSelector::Capability { capability: capability.to_owned() });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_protocol::{
        Action, Condition, ConditionOp, ConflictResolution, RuleId, RuleScope, RuleStatus, SessionId,
    };
    use fabric_rules::RuleStore;
    use fabric_storage::{FileStorageEngine, StorageConfig};
    use fabric_vector::FlatVectorIndex;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl fabric_vector::EmbeddingFn for StubEmbedder {
        async fn embed(&self, content: &str) -> Result<Vec<f32>, FabricError> {
            Ok(vec![content.len() as f32, 0.0])
        }
    }

    fn unique_root(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn dispatcher(root: &std::path::Path) -> FabricToolDispatcher {
        let memory = Arc::new(MemoryService::new(
            Arc::new(FileStorageEngine::new(root, StorageConfig::defaults())),
            Arc::new(FlatVectorIndex::new()),
            Arc::new(StubEmbedder),
            fabric_memory::MemoryConfig::default(),
            7,
        ));
        let directory = Arc::new(AgentDirectory::new(chrono::Duration::seconds(120)));
        let bus = Arc::new(CoordinationBus::new(directory.clone(), 10));
        let rules = Arc::new(RuleEngine::new(Arc::new(RuleStore::new())));
        let sync = Arc::new(SyncEngine::new(MachineId::from_string("m1"), Arc::new(FileStorageEngine::new(root, StorageConfig::defaults())), vec![], fabric_sync::SyncConfig::default()));
        FabricToolDispatcher::new(memory, directory, bus, rules, sync, MachineId::from_string("m1"))
    }

    fn ctx(tool_name: &str, parameters: Value) -> InvocationContext {
        InvocationContext {
            agent_id: AgentId::from_string("a1"),
            machine_id: MachineId::from_string("m1"),
            tool_name: tool_name.to_owned(),
            parameters,
            session_id: SessionId::from_string("s1"),
            time: chrono::Utc::now(),
        }
    }

    fn block_rule() -> fabric_protocol::Rule {
        fabric_protocol::Rule {
            rule_id: RuleId::from_string("no-secrets"),
            name: "no-secrets".into(),
            r#type: "security".into(),
            scope: RuleScope::Global,
            priority: 1000,
            status: RuleStatus::Active,
            conditions: vec![Condition {
                field: "parameters.content".into(),
                op: ConditionOp::Eq,
                value: json!("secret"),
            }],
            actions: vec![Action::Block { reason: "aws_key_detected".into() }],
            parent_rule_id: None,
            effective_from: chrono::Utc::now() - chrono::Duration::days(1),
            effective_until: None,
            version: 1,
            conflict_resolution: ConflictResolution::default(),
            dependencies: vec![],
            change_record: None,
        }
    }

    #[tokio::test]
    async fn store_memory_succeeds_and_emits_rule_audit() {
        let root = unique_root("fabric-tools-store");
        let d = dispatcher(&root);
        let outcome = d
            .dispatch(ctx("store_memory", json!({"content": "disk at 82%", "category": "infrastructure"})))
            .await;
        assert!(matches!(outcome, ToolOutcome::Ok(_)));
        let stats = d.memory.stats().await.unwrap();
        let audited = stats.counts_per_category.get(&Category::RuleAudit).copied().unwrap_or(0);
        assert_eq!(audited, 1);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn blocked_rule_short_circuits_and_still_emits_audit() {
        let root = unique_root("fabric-tools-block");
        let d = dispatcher(&root);
        d.rules.store().activate(block_rule()).await.unwrap();
        let outcome = d.dispatch(ctx("store_memory", json!({"content": "secret"}))).await;
        match outcome {
            ToolOutcome::Err(e) => assert_eq!(e.kind, "RuleViolation"),
            ToolOutcome::Ok(_) => panic!("expected a blocked outcome"),
        }
        let stats = d.memory.stats().await.unwrap();
        assert_eq!(stats.counts_per_category.get(&Category::RuleAudit).copied().unwrap_or(0), 1);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn unknown_tool_name_is_invalid_parameters() {
        let root = unique_root("fabric-tools-unknown");
        let d = dispatcher(&root);
        let outcome = d.dispatch(ctx("not_a_real_tool", Value::Null)).await;
        match outcome {
            ToolOutcome::Err(e) => assert_eq!(e.kind, "InvalidParameters"),
            ToolOutcome::Ok(_) => panic!("expected an error outcome"),
        }
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn delegate_then_cancel_round_trips_and_emits_agent_audit() {
        let root = unique_root("fabric-tools-delegate");
        let d = dispatcher(&root);
        let delegate_outcome = d.dispatch(ctx("delegate_task", json!({"required_capabilities": []}))).await;
        let ToolOutcome::Ok(value) = delegate_outcome else { panic!("expected delegate to succeed") };
        let delegation_id = value.get("delegation_id").and_then(Value::as_str).unwrap().to_owned();
        let cancel_outcome = d.dispatch(ctx("cancel_delegation", json!({"delegation_id": delegation_id}))).await;
        assert!(matches!(cancel_outcome, ToolOutcome::Ok(_)));
        let stats = d.memory.stats().await.unwrap();
        assert_eq!(stats.counts_per_category.get(&Category::Agent).copied().unwrap_or(0), 2);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn sync_status_reports_machine_clock() {
        let root = unique_root("fabric-tools-sync-status");
        let d = dispatcher(&root);
        let outcome = d.dispatch(ctx("sync_status", Value::Null)).await;
        let ToolOutcome::Ok(value) = outcome else { panic!("expected sync_status to succeed") };
        assert_eq!(value.get("machine_id").and_then(Value::as_str), Some("m1"));
        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
