//! Flat, brute-force cosine-similarity vector index (C2).
//!
//! One vector per `(id, version)`: an `upsert` for a newer version replaces
//! the prior entry outright rather than accumulating history, since only
//! the live version is ever searched.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use fabric_protocol::{FabricResult, MemoryId};
use parking_lot::RwLock;
use tracing::{debug, instrument};

/// `(id, score, version)` — a single search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: MemoryId,
    pub score: f32,
    pub version: u64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: MemoryId, version: u64, vector: Vec<f32>) -> FabricResult<()>;
    async fn remove(&self, id: &MemoryId) -> FabricResult<()>;
    /// Restrict the candidate pool to `filter` when present (e.g. the set
    /// of ids a prior keyword pass already narrowed to).
    async fn search(&self, query: &[f32], k: usize, filter: Option<&HashSet<MemoryId>>) -> FabricResult<Vec<VectorHit>>;
    async fn len(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct FlatVectorIndex {
    entries: RwLock<HashMap<MemoryId, (u64, Vec<f32>)>>,
}

impl FlatVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for FlatVectorIndex {
    #[instrument(skip(self, vector), fields(id = %id, version, dims = vector.len()))]
    async fn upsert(&self, id: MemoryId, version: u64, vector: Vec<f32>) -> FabricResult<()> {
        self.entries.write().insert(id, (version, vector));
        Ok(())
    }

    async fn remove(&self, id: &MemoryId) -> FabricResult<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    #[instrument(skip(self, query, filter), fields(k, dims = query.len()))]
    async fn search(&self, query: &[f32], k: usize, filter: Option<&HashSet<MemoryId>>) -> FabricResult<Vec<VectorHit>> {
        let entries = self.entries.read();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|(id, _)| filter.map(|f| f.contains(*id)).unwrap_or(true))
            .map(|(id, (version, vector))| VectorHit {
                id: id.clone(),
                score: cosine_similarity(query, vector),
                version: *version,
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        debug!(returned = hits.len(), "vector search complete");
        Ok(hits)
    }

    async fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_search_finds_closest_vector() {
        let index = FlatVectorIndex::new();
        index.upsert(MemoryId::from_string("a"), 1, vec![1.0, 0.0]).await.unwrap();
        index.upsert(MemoryId::from_string("b"), 1, vec![0.0, 1.0]).await.unwrap();
        let hits = index.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits[0].id, MemoryId::from_string("a"));
    }

    #[tokio::test]
    async fn upsert_replaces_prior_version_for_same_id() {
        let index = FlatVectorIndex::new();
        index.upsert(MemoryId::from_string("a"), 1, vec![1.0, 0.0]).await.unwrap();
        index.upsert(MemoryId::from_string("a"), 2, vec![0.0, 1.0]).await.unwrap();
        assert_eq!(index.len().await, 1);
        let hits = index.search(&[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].version, 2);
    }

    #[tokio::test]
    async fn remove_drops_entry() {
        let index = FlatVectorIndex::new();
        index.upsert(MemoryId::from_string("a"), 1, vec![1.0, 0.0]).await.unwrap();
        index.remove(&MemoryId::from_string("a")).await.unwrap();
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test]
    async fn search_respects_candidate_filter() {
        let index = FlatVectorIndex::new();
        index.upsert(MemoryId::from_string("a"), 1, vec![1.0, 0.0]).await.unwrap();
        index.upsert(MemoryId::from_string("b"), 1, vec![1.0, 0.0]).await.unwrap();
        let mut filter = HashSet::new();
        filter.insert(MemoryId::from_string("b"));
        let hits = index.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, MemoryId::from_string("b"));
    }

    #[test]
    fn cosine_similarity_is_one_for_identical_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_is_zero_for_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
