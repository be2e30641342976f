//! Memory service (C3): the only component that mints `MemoryItem`s.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fabric_protocol::{
    AgentId, Category, FabricError, FabricResult, MachineId, MemoryId, MemoryItem, Scope,
};
use fabric_storage::{ScanFilter, StorageEngine, StorageStats};
use fabric_vector::{EmbeddingFn, VectorIndex};
use indexmap::IndexSet;
use tracing::{info, instrument, warn};

use crate::config::MemoryConfig;
use crate::dedup::find_duplicate;
use crate::ranking::{rank, Candidate, RankedItem};

/// Per-field filter for `search` and `scan`-backed tools; each present
/// field narrows the keyword pass over C1's secondary indices.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub category: Option<Category>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub enum BulkOp {
    Delete { reason: String },
}

#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub id: MemoryId,
    pub result: Result<(), String>,
}

pub struct MemoryService {
    storage: Arc<dyn StorageEngine>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingFn>,
    config: MemoryConfig,
    id_salt: u64,
}

impl MemoryService {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingFn>,
        config: MemoryConfig,
        id_salt: u64,
    ) -> Self {
        MemoryService { storage, vector_index, embedder, config, id_salt }
    }

    #[instrument(skip(self, content, tags, context), fields(category = ?category))]
    pub async fn store(
        &self,
        content: String,
        category: Category,
        tags: IndexSet<String>,
        context: Option<String>,
        scope: Scope,
        origin_machine: MachineId,
        origin_agent: AgentId,
    ) -> FabricResult<MemoryId> {
        let scope = if category.always_broadcasts() && scope < Scope::Project {
            Scope::Project
        } else {
            scope
        };

        let embedding = match self.embedder.embed(&content).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "embedding failed, storing with vector_pending");
                None
            }
        };

        if let Some(vector) = &embedding {
            let threshold = self.config.dedup_threshold_for(category);
            if let Some(existing_id) = find_duplicate(
                self.storage.as_ref(),
                self.vector_index.as_ref(),
                category,
                &tags,
                vector,
                threshold,
            )
            .await?
            {
                info!(id = %existing_id, "store deduplicated to existing item");
                return Ok(existing_id);
            }
        }

        let id = MemoryId::derive(content.as_bytes(), self.id_salt);
        let now = Utc::now();
        let item = MemoryItem {
            id: id.clone(),
            content,
            category,
            tags,
            context,
            scope,
            origin_machine,
            origin_agent,
            created_at: now,
            updated_at: now,
            version: 1,
            tombstone: false,
            format_version: 1,
            vector_pending: embedding.is_none(),
        };
        self.storage.put(item).await?;
        if let Some(vector) = embedding {
            self.vector_index.upsert(id.clone(), 1, vector).await?;
        }
        Ok(id)
    }

    pub async fn retrieve(&self, id: &MemoryId) -> FabricResult<MemoryItem> {
        match self.storage.get(id).await? {
            Some(item) if !item.tombstone => Ok(item),
            _ => Err(FabricError::NotFound(id.to_string())),
        }
    }

    #[instrument(skip(self, query), fields(k))]
    pub async fn search(&self, query: &str, filter: SearchFilter, k: usize) -> FabricResult<Vec<RankedItem>> {
        let keyword_matches = self
            .storage
            .scan(ScanFilter { category: filter.category, tag: filter.tag.clone(), ..ScanFilter::default() })
            .await?;

        let query_embedding = self.embedder.embed(query).await.ok();
        let candidate_ids: HashSet<MemoryId> = keyword_matches.iter().map(|item| item.id.clone()).collect();

        let vector_hits = match &query_embedding {
            Some(vector) if !candidate_ids.is_empty() => {
                self.vector_index.search(vector, candidate_ids.len(), Some(&candidate_ids)).await?
            }
            Some(vector) => self.vector_index.search(vector, k * 4, None).await?,
            None => Vec::new(),
        };

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for item in keyword_matches {
            let keyword_score = keyword_overlap_score(query, &item);
            let vector_score = vector_hits.iter().find(|h| h.id == item.id).map(|h| h.score);
            seen.insert(item.id.clone());
            candidates.push(Candidate { item, vector_score, keyword_score: Some(keyword_score) });
        }
        for hit in vector_hits {
            if seen.contains(&hit.id) {
                continue;
            }
            if let Some(item) = self.storage.get(&hit.id).await? {
                if item.tombstone || item.version != hit.version {
                    continue;
                }
                candidates.push(Candidate { item, vector_score: Some(hit.score), keyword_score: None });
            }
        }

        let mut ranked = rank(candidates, self.config.ranking, Utc::now());
        ranked.truncate(k);
        Ok(ranked)
    }

    pub async fn delete(&self, id: &MemoryId, _reason: String, origin_machine: MachineId, origin_agent: AgentId) -> FabricResult<()> {
        let tombstone = self.storage.delete(id, &origin_machine, &origin_agent).await?;
        self.vector_index.remove(&tombstone.id).await?;
        Ok(())
    }

    pub async fn bulk(&self, op: BulkOp, ids: Vec<MemoryId>, origin_machine: MachineId, origin_agent: AgentId) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let result = match &op {
                BulkOp::Delete { reason } => {
                    self.delete(&id, reason.clone(), origin_machine.clone(), origin_agent.clone())
                        .await
                        .map_err(|e| e.to_string())
                }
            };
            outcomes.push(BulkOutcome { id, result });
        }
        outcomes
    }

    pub async fn stats(&self) -> FabricResult<StorageStats> {
        self.storage.stats().await
    }
}

/// Cheap keyword overlap: fraction of query tokens found verbatim in the
/// item's content or tags, case-insensitive.
fn keyword_overlap_score(query: &str, item: &MemoryItem) -> f32 {
    let query_tokens: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let haystack = item.content.to_lowercase();
    let matched = query_tokens
        .iter()
        .filter(|token| haystack.contains(token.as_str()) || item.tags.iter().any(|tag| tag.to_lowercase() == **token))
        .count();
    matched as f32 / query_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_storage::{FileStorageEngine, StorageConfig};
    use fabric_vector::FlatVectorIndex;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingFn for StubEmbedder {
        async fn embed(&self, content: &str) -> Result<Vec<f32>, FabricError> {
            Ok(vec![content.len() as f32, 0.0])
        }
    }

    fn unique_root(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn service(root: &std::path::Path) -> MemoryService {
        MemoryService::new(
            Arc::new(FileStorageEngine::new(root, StorageConfig::defaults())),
            Arc::new(FlatVectorIndex::new()),
            Arc::new(StubEmbedder),
            MemoryConfig::default(),
            42,
        )
    }

    #[tokio::test]
    async fn store_then_retrieve_roundtrips() {
        let root = unique_root("fabric-memory-store");
        let svc = service(&root);
        let id = svc
            .store(
                "disk at 82%".into(),
                Category::Infrastructure,
                IndexSet::new(),
                None,
                Scope::Machine,
                MachineId::from_string("m1"),
                AgentId::from_string("a1"),
            )
            .await
            .unwrap();
        let item = svc.retrieve(&id).await.unwrap();
        assert_eq!(item.content, "disk at 82%");
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn retrieve_never_returns_a_tombstone() {
        let root = unique_root("fabric-memory-tombstone");
        let svc = service(&root);
        let id = svc
            .store(
                "temp note".into(),
                Category::Global,
                IndexSet::new(),
                None,
                Scope::Local,
                MachineId::from_string("m1"),
                AgentId::from_string("a1"),
            )
            .await
            .unwrap();
        svc.delete(&id, "cleanup".into(), MachineId::from_string("m1"), AgentId::from_string("a1"))
            .await
            .unwrap();
        let err = svc.retrieve(&id).await.unwrap_err();
        assert!(matches!(err, FabricError::NotFound(_)));
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn incidents_category_upgrades_scope_to_at_least_project() {
        let root = unique_root("fabric-memory-incidents");
        let svc = service(&root);
        let id = svc
            .store(
                "pager fired".into(),
                Category::Incidents,
                IndexSet::new(),
                None,
                Scope::Local,
                MachineId::from_string("m1"),
                AgentId::from_string("a1"),
            )
            .await
            .unwrap();
        let item = svc.retrieve(&id).await.unwrap();
        assert!(item.scope >= Scope::Project);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn bulk_delete_reports_per_id_outcome() {
        let root = unique_root("fabric-memory-bulk");
        let svc = service(&root);
        let id = svc
            .store("a".into(), Category::Global, IndexSet::new(), None, Scope::Local, MachineId::from_string("m1"), AgentId::from_string("a1"))
            .await
            .unwrap();
        let missing = MemoryId::from_string("does-not-exist");
        let outcomes = svc
            .bulk(BulkOp::Delete { reason: "cleanup".into() }, vec![id.clone(), missing.clone()], MachineId::from_string("m1"), AgentId::from_string("a1"))
            .await;
        assert!(outcomes.iter().find(|o| o.id == id).unwrap().result.is_ok());
        assert!(outcomes.iter().find(|o| o.id == missing).unwrap().result.is_err());
        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
