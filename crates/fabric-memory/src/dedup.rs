//! Deduplication on `store`: a live item in the same category with cosine
//! similarity above threshold and identical tags returns the existing id
//! instead of minting a new one.

use std::collections::HashSet;

use fabric_protocol::{Category, FabricResult, MemoryId};
use fabric_storage::{ScanFilter, StorageEngine};
use fabric_vector::VectorIndex;
use indexmap::IndexSet;

pub async fn find_duplicate(
    storage: &dyn StorageEngine,
    vector_index: &dyn VectorIndex,
    category: Category,
    tags: &IndexSet<String>,
    embedding: &[f32],
    threshold: f32,
) -> FabricResult<Option<MemoryId>> {
    if category.is_audit() {
        return Ok(None);
    }

    let same_category: HashSet<MemoryId> = storage
        .scan(ScanFilter { category: Some(category), ..ScanFilter::default() })
        .await?
        .into_iter()
        .filter(|item| item.tags == *tags)
        .map(|item| item.id)
        .collect();

    if same_category.is_empty() {
        return Ok(None);
    }

    let hits = vector_index.search(embedding, same_category.len(), Some(&same_category)).await?;
    Ok(hits.into_iter().find(|hit| hit.score >= threshold).map(|hit| hit.id))
}
