//! Default local `EmbeddingFn`: a deterministic hashed bag-of-words vector.
//!
//! The embedding function itself is out of scope (spec.md §9 open
//! question: "any function producing fixed-dimensional numeric vectors
//! with cosine similarity ≥0.97 considered near-duplicate is admissible").
//! This is the stand-in the binaries wire in by default so the fabric runs
//! end to end without a network call to a real model provider; an operator
//! swaps it for one behind the same trait.

use async_trait::async_trait;
use fabric_protocol::FabricError;

use crate::reconciler::EmbeddingFn;

const DIMS: usize = 64;

/// Hashes whitespace-separated tokens into `DIMS` buckets, signed by a
/// second hash so opposite tokens partially cancel instead of only adding,
/// then L2-normalizes. Same content always produces the same vector.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        HashingEmbedder
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn embed_text(content: &str) -> Vec<f32> {
    let mut vector = vec![0f32; DIMS];
    for token in content.split_whitespace() {
        let lower = token.to_lowercase();
        let hash = fnv1a(lower.as_bytes());
        let bucket = (hash % DIMS as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingFn for HashingEmbedder {
    async fn embed(&self, content: &str) -> Result<Vec<f32>, FabricError> {
        Ok(embed_text(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_embeds_identically() {
        assert_eq!(embed_text("disk at 82%"), embed_text("disk at 82%"));
    }

    #[test]
    fn dimension_is_fixed() {
        assert_eq!(embed_text("short").len(), DIMS);
        assert_eq!(embed_text("a much longer piece of operational context here").len(), DIMS);
    }

    #[test]
    fn near_duplicate_text_scores_above_threshold() {
        let a = embed_text("disk usage at 82 percent on host db-1");
        let b = embed_text("disk usage at 82 percent on host db-1 now");
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot > 0.97, "expected near-duplicate cosine similarity, got {dot}");
    }

    #[test]
    fn unrelated_text_scores_low() {
        let a = embed_text("disk usage at 82 percent");
        let b = embed_text("deployment of service checkout succeeded");
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot < 0.5, "expected unrelated content to score low, got {dot}");
    }
}
