//! Operator-supplied storage configuration.
//!
//! The retention horizon differs by category and is not something the
//! implementation can infer; an operator must supply the full matrix (or
//! accept the conservative defaults below) via `fabric-transport`'s layered
//! configuration.

use std::collections::HashMap;
use std::time::Duration;

use fabric_protocol::Category;

/// Largest serialized `MemoryItem` accepted by a write, matching the sync
/// fabric's `RecordTooLarge` threshold so a record that can't replicate is
/// also never admitted locally.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Per-category retention TTL for live items.
    pub retention: HashMap<Category, Duration>,
    /// Per-category write quota (item count). `None` means unbounded.
    pub quota: HashMap<Category, Option<u64>>,
    /// Lower bound under which a tombstone is never swept, regardless of
    /// its category TTL, so in-flight sync rounds never miss a deletion.
    pub sync_horizon: Duration,
}

impl StorageConfig {
    /// Conservative defaults: 30 days of retention and no quota for every
    /// category, a 24h sync horizon. Operators override via configuration.
    pub fn defaults() -> Self {
        let thirty_days = Duration::from_secs(30 * 24 * 3600);
        let categories = [
            Category::Global,
            Category::Project,
            Category::Infrastructure,
            Category::Incidents,
            Category::Deployments,
            Category::Monitoring,
            Category::Runbooks,
            Category::Security,
            Category::Agent,
            Category::RuleAudit,
        ];
        let mut retention = HashMap::new();
        let mut quota = HashMap::new();
        for category in categories {
            retention.insert(category, thirty_days);
            quota.insert(category, None);
        }
        StorageConfig {
            retention,
            quota,
            sync_horizon: Duration::from_secs(24 * 3600),
        }
    }

    pub fn retention_for(&self, category: Category) -> Duration {
        self.retention
            .get(&category)
            .copied()
            .unwrap_or(Duration::from_secs(30 * 24 * 3600))
    }

    /// Tombstones linger at least `max(category TTL, sync horizon)`.
    pub fn tombstone_ttl_for(&self, category: Category) -> Duration {
        self.retention_for(category).max(self.sync_horizon)
    }

    pub fn quota_for(&self, category: Category) -> Option<u64> {
        self.quota.get(&category).copied().flatten()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
