//! The canonical tool table, grounded on `aios-tools::ToolRegistry`'s
//! name/description/kind shape, generalized from filesystem/sandbox
//! operations to the C3/C5/C6/C7 operations this fabric exposes.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricToolKind {
    StoreMemory,
    RetrieveMemory,
    SearchMemories,
    DeleteMemory,
    BulkDeleteMemories,
    RegisterAgent,
    Heartbeat,
    ListAgents,
    GetAgentStatus,
    BroadcastDiscovery,
    DelegateTask,
    CancelDelegation,
    AcknowledgeMessage,
    QueryCollective,
    SyncStatus,
    ForceSync,
    GetFormatGuide,
    GetMemoryAccessStats,
}

impl FabricToolKind {
    pub fn parse(name: &str) -> Option<Self> {
        use FabricToolKind::*;
        Some(match name {
            "store_memory" => StoreMemory,
            "retrieve_memory" => RetrieveMemory,
            "search_memories" => SearchMemories,
            "delete_memory" => DeleteMemory,
            "bulk_delete_memories" => BulkDeleteMemories,
            "register_agent" => RegisterAgent,
            "heartbeat" => Heartbeat,
            "list_agents" => ListAgents,
            "get_agent_status" => GetAgentStatus,
            "broadcast_discovery" => BroadcastDiscovery,
            "delegate_task" => DelegateTask,
            "cancel_delegation" => CancelDelegation,
            "acknowledge_message" => AcknowledgeMessage,
            "query_collective" => QueryCollective,
            "sync_status" => SyncStatus,
            "force_sync" => ForceSync,
            "get_format_guide" => GetFormatGuide,
            "get_memory_access_stats" => GetMemoryAccessStats,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FabricToolKind,
}

#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolDefinition>,
}

impl ToolRegistry {
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    pub fn with_core_tools() -> Self {
        use FabricToolKind::*;
        let entries = [
            (StoreMemory, "store_memory", "Create a MemoryItem in the collective store"),
            (RetrieveMemory, "retrieve_memory", "Fetch one MemoryItem by id"),
            (SearchMemories, "search_memories", "Ranked keyword + vector search over MemoryItems"),
            (DeleteMemory, "delete_memory", "Tombstone one MemoryItem"),
            (BulkDeleteMemories, "bulk_delete_memories", "Tombstone many MemoryItems by id"),
            (RegisterAgent, "register_agent", "Register or refresh this agent's directory entry"),
            (Heartbeat, "heartbeat", "Report liveness and health, resetting the directory TTL"),
            (ListAgents, "list_agents", "List directory agents matching role/capability/lifecycle filters"),
            (GetAgentStatus, "get_agent_status", "Fetch one agent's directory entry"),
            (BroadcastDiscovery, "broadcast_discovery", "Broadcast a discovery payload to a target selector"),
            (DelegateTask, "delegate_task", "Delegate work to the least-loaded qualified agent"),
            (CancelDelegation, "cancel_delegation", "Cancel a queued or assigned delegation"),
            (AcknowledgeMessage, "acknowledge_message", "Acknowledge receipt of an inbox message"),
            (QueryCollective, "query_collective", "Broadcast a question and collect short-lived responses"),
            (SyncStatus, "sync_status", "Report this machine's sync clock and catchup state"),
            (ForceSync, "force_sync", "Trigger an out-of-band sync round against one or all peers"),
            (GetFormatGuide, "get_format_guide", "Describe the MemoryItem schema and canonical categories"),
            (GetMemoryAccessStats, "get_memory_access_stats", "Report per-category storage counts and quota headroom"),
        ];
        let mut tools = HashMap::new();
        for (kind, name, description) in entries {
            tools.insert(name, ToolDefinition { name, description, kind });
        }
        ToolRegistry { tools }
    }
}
