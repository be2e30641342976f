//! `MemoryItem` and `EmbeddingRecord` — the atoms persisted by the storage
//! engine and vector index.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::enums::{Category, Scope};
use crate::ids::{AgentId, MachineId, MemoryId};

/// The atom of the system. Owned exclusively by the memory service; every
/// other component resolves a `MemoryItem` by id rather than holding one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: MemoryId,
    /// Opaque, expected UTF-8. Empty when `tombstone` is true.
    pub content: String,
    pub category: Category,
    pub tags: IndexSet<String>,
    pub context: Option<String>,
    pub scope: Scope,
    pub origin_machine: MachineId,
    pub origin_agent: AgentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Per-id integer, monotonically increasing at the origin.
    pub version: u64,
    pub tombstone: bool,
    pub format_version: u16,
    /// Set by the memory service when the embedding step of a two-step
    /// write fails; cleared by the background reconciler once caught up.
    pub vector_pending: bool,
}

impl MemoryItem {
    /// Build the tombstone that supersedes this item at `version + 1`.
    pub fn tombstone_of(&self) -> MemoryItem {
        MemoryItem {
            id: self.id.clone(),
            content: String::new(),
            category: self.category,
            tags: self.tags.clone(),
            context: self.context.clone(),
            scope: self.scope,
            origin_machine: self.origin_machine.clone(),
            origin_agent: self.origin_agent.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
            version: self.version + 1,
            tombstone: true,
            format_version: self.format_version,
            vector_pending: false,
        }
    }

    /// Last-writer-wins ordering key used when two replicas disagree on the
    /// live version of the same id: higher version wins, ties broken
    /// lexicographically by `origin_machine`.
    pub fn lww_key(&self) -> (u64, &str) {
        (self.version, self.origin_machine.as_str())
    }
}

/// Produced by an embedding function over `content`; one per live
/// (non-tombstone) `MemoryItem` version, keyed by `(id, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: MemoryId,
    pub version: u64,
    pub vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryItem {
        MemoryItem {
            id: MemoryId::derive(b"disk at 82%", 1),
            content: "disk at 82%".into(),
            category: Category::Infrastructure,
            tags: IndexSet::new(),
            context: None,
            scope: Scope::Machine,
            origin_machine: MachineId::from_string("m1"),
            origin_agent: AgentId::from_string("a1"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
            tombstone: false,
            format_version: 1,
            vector_pending: false,
        }
    }

    #[test]
    fn tombstone_of_clears_content_and_bumps_version() {
        let item = sample();
        let tomb = item.tombstone_of();
        assert!(tomb.content.is_empty());
        assert!(tomb.tombstone);
        assert_eq!(tomb.version, item.version + 1);
        assert_eq!(tomb.id, item.id);
    }

    #[test]
    fn lww_key_compares_version_then_origin_machine() {
        let a = sample();
        let mut b = sample();
        b.version = 2;
        assert!(a.lww_key() < b.lww_key());
    }
}
