//! In-memory secondary indices over the primary store.
//!
//! Indices are eventually consistent with the primary store within one
//! operation: every mutation updates them synchronously under the engine's
//! per-id lock, so a reader never observes a primary write without its
//! corresponding index update, but two concurrent readers may still cross
//! an id's old and new entries across two different indices (never both
//! stale).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fabric_protocol::{Category, MachineId, MemoryId};

#[derive(Debug, Default)]
pub struct SecondaryIndices {
    by_category: DashMap<Category, BTreeSet<MemoryId>>,
    by_tag: DashMap<String, BTreeSet<MemoryId>>,
    by_origin_machine: DashMap<MachineId, BTreeSet<MemoryId>>,
    /// Sorted by timestamp descending for `scan`'s ordering contract;
    /// ties broken by id for a total order.
    by_updated_at: parking_lot::RwLock<BTreeSet<(DateTime<Utc>, MemoryId)>>,
}

impl SecondaryIndices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, item: &fabric_protocol::MemoryItem) {
        self.by_category.entry(item.category).or_default().insert(item.id.clone());
        for tag in &item.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(item.id.clone());
        }
        self.by_origin_machine
            .entry(item.origin_machine.clone())
            .or_default()
            .insert(item.id.clone());
        self.by_updated_at
            .write()
            .insert((item.updated_at, item.id.clone()));
    }

    /// Remove a previous version's entries before indexing its successor,
    /// so stale tag/timestamp pairs don't accumulate across versions.
    pub fn unindex(&self, item: &fabric_protocol::MemoryItem) {
        if let Some(mut set) = self.by_category.get_mut(&item.category) {
            set.remove(&item.id);
        }
        for tag in &item.tags {
            if let Some(mut set) = self.by_tag.get_mut(tag) {
                set.remove(&item.id);
            }
        }
        if let Some(mut set) = self.by_origin_machine.get_mut(&item.origin_machine) {
            set.remove(&item.id);
        }
        self.by_updated_at.write().remove(&(item.updated_at, item.id.clone()));
    }

    pub fn ids_by_category(&self, category: Category) -> Vec<MemoryId> {
        self.by_category
            .get(&category)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids_by_tag(&self, tag: &str) -> Vec<MemoryId> {
        self.by_tag
            .get(tag)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids_by_origin_machine(&self, machine: &MachineId) -> Vec<MemoryId> {
        self.by_origin_machine
            .get(machine)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All ids ordered by `updated_at` descending, for `scan`.
    pub fn ids_by_updated_at_desc(&self) -> Vec<MemoryId> {
        self.by_updated_at
            .read()
            .iter()
            .rev()
            .map(|(_, id)| id.clone())
            .collect()
    }
}
