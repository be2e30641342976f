//! The durable record store keyed by id (C1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use fabric_protocol::{Category, FabricError, FabricResult, MachineId, MemoryId, MemoryItem};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, instrument, warn};

use crate::config::{StorageConfig, MAX_RECORD_BYTES};
use crate::index::SecondaryIndices;

/// Optional predicate used by `scan` and the memory service's keyword
/// search path.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub category: Option<Category>,
    pub tag: Option<String>,
    pub origin_machine: Option<MachineId>,
    pub include_tombstones: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    pub counts_per_category: HashMap<Category, u64>,
    pub quota_headroom: HashMap<Category, Option<u64>>,
}

#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn put(&self, item: MemoryItem) -> FabricResult<MemoryItem>;
    async fn get(&self, id: &MemoryId) -> FabricResult<Option<MemoryItem>>;
    async fn delete(&self, id: &MemoryId, origin_machine: &MachineId, origin_agent: &fabric_protocol::AgentId) -> FabricResult<MemoryItem>;
    async fn scan(&self, filter: ScanFilter) -> FabricResult<Vec<MemoryItem>>;
    async fn stats(&self) -> FabricResult<StorageStats>;
    /// Sweep tombstones whose `max(category TTL, sync horizon)` has
    /// elapsed. Returns the number of records removed.
    async fn sweep_expired_tombstones(&self) -> FabricResult<u64>;
}

/// Per-id append-only JSONL log under `root/items/`, with an in-memory
/// latest-version cache so reads never need to replay a file.
pub struct FileStorageEngine {
    root: PathBuf,
    config: StorageConfig,
    write_locks: Mutex<HashMap<MemoryId, Arc<tokio::sync::Mutex<()>>>>,
    cache: DashMap<MemoryId, MemoryItem>,
    indices: SecondaryIndices,
}

enum PutDecision {
    Accept,
    Reject(FabricError),
    /// The incoming write lost last-writer-wins arbitration; the stored
    /// item is returned unchanged, no error.
    NoOp,
}

impl FileStorageEngine {
    pub fn new(root: impl Into<PathBuf>, config: StorageConfig) -> Self {
        FileStorageEngine {
            root: root.into(),
            config,
            write_locks: Mutex::new(HashMap::new()),
            cache: DashMap::new(),
            indices: SecondaryIndices::new(),
        }
    }

    fn file_path(&self, id: &MemoryId) -> PathBuf {
        self.root.join("items").join(format!("{}.jsonl", id.as_str()))
    }

    async fn ensure_parent(path: &Path) -> FabricResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FabricError::StorageUnavailable(format!("create dir {parent:?}: {e}")))?;
        }
        Ok(())
    }

    fn lock_for(&self, id: &MemoryId) -> Arc<tokio::sync::Mutex<()>> {
        self.write_locks
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Rebuild the in-memory cache and secondary indices from the on-disk
    /// log, mirroring how the vector index may be rebuilt by replaying C1.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> FabricResult<()> {
        let items_dir = self.root.join("items");
        if !fs::try_exists(&items_dir).await.unwrap_or(false) {
            return Ok(());
        }
        let mut entries = fs::read_dir(&items_dir)
            .await
            .map_err(|e| FabricError::StorageUnavailable(format!("read_dir {items_dir:?}: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FabricError::StorageUnavailable(e.to_string()))?
        {
            if let Some(item) = Self::read_latest(&entry.path()).await? {
                self.indices.index(&item);
                self.cache.insert(item.id.clone(), item);
            }
        }
        debug!(count = self.cache.len(), "storage engine cache rebuilt");
        Ok(())
    }

    async fn read_latest(path: &Path) -> FabricResult<Option<MemoryItem>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .await
            .map_err(|e| FabricError::StorageUnavailable(e.to_string()))?;
        let mut reader = BufReader::new(file).lines();
        let mut latest: Option<MemoryItem> = None;
        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|e| FabricError::CorruptedStorage(e.to_string()))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let item: MemoryItem = serde_json::from_str(&line)
                .map_err(|e| FabricError::CorruptedStorage(format!("{path:?}: {e}")))?;
            latest = Some(item);
        }
        Ok(latest)
    }

    fn decide(existing: Option<&MemoryItem>, incoming: &MemoryItem) -> PutDecision {
        let Some(existing) = existing else {
            return PutDecision::Accept;
        };
        if existing.origin_machine == incoming.origin_machine {
            if incoming.version > existing.version {
                PutDecision::Accept
            } else {
                PutDecision::Reject(FabricError::VersionConflict {
                    stored: existing.version,
                    attempted: incoming.version,
                })
            }
        } else if incoming.lww_key() > existing.lww_key() {
            PutDecision::Accept
        } else {
            PutDecision::NoOp
        }
    }

    fn check_quota(&self, category: Category) -> FabricResult<()> {
        if let Some(limit) = self.config.quota_for(category) {
            let current = self.indices.ids_by_category(category).len() as u64;
            if current >= limit {
                return Err(FabricError::QuotaExceeded(format!("{category:?}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for FileStorageEngine {
    #[instrument(skip(self, item), fields(id = %item.id, version = item.version))]
    async fn put(&self, item: MemoryItem) -> FabricResult<MemoryItem> {
        let size = item.content.len();
        if size > MAX_RECORD_BYTES {
            return Err(FabricError::RecordTooLarge { size_bytes: size as u64 });
        }

        let lock = self.lock_for(&item.id);
        let _guard = lock.lock().await;

        let existing = self.cache.get(&item.id).map(|r| r.value().clone());
        if existing.is_none() && !item.tombstone {
            self.check_quota(item.category)?;
        }

        match Self::decide(existing.as_ref(), &item) {
            PutDecision::Reject(err) => return Err(err),
            PutDecision::NoOp => return Ok(existing.expect("NoOp implies existing present")),
            PutDecision::Accept => {}
        }

        let path = self.file_path(&item.id);
        Self::ensure_parent(&path).await?;
        let line = serde_json::to_string(&item)
            .map_err(|e| FabricError::InvariantViolation(format!("serialize {}: {e}", item.id)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| FabricError::StorageUnavailable(format!("open {path:?}: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| FabricError::StorageUnavailable(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| FabricError::StorageUnavailable(e.to_string()))?;
        file.flush().await.map_err(|e| FabricError::StorageUnavailable(e.to_string()))?;

        if let Some(prev) = &existing {
            self.indices.unindex(prev);
        }
        self.indices.index(&item);
        self.cache.insert(item.id.clone(), item.clone());
        debug!("item written");
        Ok(item)
    }

    async fn get(&self, id: &MemoryId) -> FabricResult<Option<MemoryItem>> {
        Ok(self.cache.get(id).map(|r| r.value().clone()))
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete(&self, id: &MemoryId, origin_machine: &MachineId, origin_agent: &fabric_protocol::AgentId) -> FabricResult<MemoryItem> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| FabricError::NotFound(id.to_string()))?;
        if current.tombstone {
            return Ok(current);
        }
        let mut tombstone = current.tombstone_of();
        tombstone.origin_machine = origin_machine.clone();
        tombstone.origin_agent = origin_agent.clone();
        self.put(tombstone).await
    }

    async fn scan(&self, filter: ScanFilter) -> FabricResult<Vec<MemoryItem>> {
        let candidate_ids: Vec<MemoryId> = match (&filter.category, &filter.tag, &filter.origin_machine) {
            (Some(category), _, _) => self.indices.ids_by_category(*category),
            (None, Some(tag), _) => self.indices.ids_by_tag(tag),
            (None, None, Some(machine)) => self.indices.ids_by_origin_machine(machine),
            (None, None, None) => self.indices.ids_by_updated_at_desc(),
        };

        let mut out: Vec<MemoryItem> = candidate_ids
            .into_iter()
            .filter_map(|id| self.cache.get(&id).map(|r| r.value().clone()))
            .filter(|item| filter.include_tombstones || !item.tombstone)
            .filter(|item| filter.tag.as_deref().map(|t| item.tags.contains(t)).unwrap_or(true))
            .filter(|item| filter.origin_machine.as_ref().map(|m| &item.origin_machine == m).unwrap_or(true))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn stats(&self) -> FabricResult<StorageStats> {
        let mut counts_per_category = HashMap::new();
        let mut quota_headroom = HashMap::new();
        for category in [
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
        ] {
            let count = self.indices.ids_by_category(category).len() as u64;
            counts_per_category.insert(category, count);
            let headroom = self.config.quota_for(category).map(|limit| limit.saturating_sub(count));
            quota_headroom.insert(category, headroom);
        }
        Ok(StorageStats { counts_per_category, quota_headroom })
    }

    #[instrument(skip(self))]
    async fn sweep_expired_tombstones(&self) -> FabricResult<u64> {
        let now = Utc::now();
        let mut swept = 0u64;
        let candidates: Vec<MemoryItem> = self
            .cache
            .iter()
            .filter(|r| r.value().tombstone)
            .map(|r| r.value().clone())
            .collect();
        for item in candidates {
            let ttl = self.config.tombstone_ttl_for(item.category);
            let age = now.signed_duration_since(item.updated_at);
            if age.to_std().map(|a| a > ttl).unwrap_or(false) {
                self.cache.remove(&item.id);
                self.indices.unindex(&item);
                let path = self.file_path(&item.id);
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(?path, error = %e, "failed to remove swept tombstone file");
                }
                swept += 1;
            }
        }
        debug!(swept, "tombstone sweep complete");
        Ok(swept)
    }
}
