//! Peer configuration and scope-based replication eligibility.

use std::collections::HashSet;

use fabric_protocol::{MachineId, MemoryItem, Scope};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub machine_id: MachineId,
    pub base_url: String,
    /// Project tags this peer is subscribed to; `Scope::Project` items only
    /// replicate to peers sharing at least one of an item's tags here.
    pub project_tags: HashSet<String>,
}

/// `local`/`machine` never leave the origin, `project` only to peers
/// sharing the project tag, `network-shared` everywhere.
pub fn eligible_for_peer(item: &MemoryItem, peer: &PeerConfig) -> bool {
    match item.scope {
        Scope::Local | Scope::Machine => false,
        Scope::NetworkShared => true,
        Scope::Project => item.tags.iter().any(|t| peer.project_tags.contains(t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_protocol::{AgentId, Category};
    use indexmap::IndexSet;
    use std::collections::HashSet as StdHashSet;

    fn item(scope: Scope, tags: &[&str]) -> MemoryItem {
        let now = chrono::Utc::now();
        MemoryItem {
            id: fabric_protocol::MemoryId::from_string("id1"),
            content: "x".into(),
            category: Category::Project,
            tags: tags.iter().map(|t| t.to_string()).collect::<IndexSet<_>>(),
            context: None,
            scope,
            origin_machine: MachineId::from_string("m1"),
            origin_agent: AgentId::from_string("a1"),
            created_at: now,
            updated_at: now,
            version: 1,
            tombstone: false,
            format_version: 1,
            vector_pending: false,
        }
    }

    fn peer_with_tags(tags: &[&str]) -> PeerConfig {
        PeerConfig {
            machine_id: MachineId::from_string("peer"),
            base_url: "http://peer".into(),
            project_tags: tags.iter().map(|t| t.to_string()).collect::<StdHashSet<_>>(),
        }
    }

    #[test]
    fn local_and_machine_scope_never_replicate() {
        let peer = peer_with_tags(&["proj-a"]);
        assert!(!eligible_for_peer(&item(Scope::Local, &[]), &peer));
        assert!(!eligible_for_peer(&item(Scope::Machine, &[]), &peer));
    }

    #[test]
    fn network_shared_always_replicates() {
        let peer = peer_with_tags(&[]);
        assert!(eligible_for_peer(&item(Scope::NetworkShared, &[]), &peer));
    }

    #[test]
    fn project_scope_requires_shared_tag() {
        let peer = peer_with_tags(&["proj-a"]);
        assert!(eligible_for_peer(&item(Scope::Project, &["proj-a"]), &peer));
        assert!(!eligible_for_peer(&item(Scope::Project, &["proj-b"]), &peer));
    }
}
