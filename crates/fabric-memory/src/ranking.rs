//! Merge-and-rank for `search`: combines a keyword pass over C1's
//! secondary indices with a vector pass over C2.

use chrono::{DateTime, Utc};
use fabric_protocol::MemoryItem;

use crate::config::RankingWeights;

#[derive(Debug, Clone)]
pub struct RankedItem {
    pub item: MemoryItem,
    pub score: f32,
}

/// Exponential half-life decay: 0 at `now`, halves every
/// `half_life_days`.
fn age_decay(updated_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f32) -> f32 {
    let age_days = now.signed_duration_since(updated_at).num_seconds() as f32 / 86_400.0;
    if age_days <= 0.0 {
        return 0.0;
    }
    1.0 - 0.5f32.powf(age_days / half_life_days)
}

/// Min-max normalize `scores` to `[0, 1]`; a flat input (or empty) maps to
/// all zeros rather than dividing by zero.
fn normalize(scores: &[f32]) -> Vec<f32> {
    let Some(min) = scores.iter().cloned().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().cloned().reduce(f32::max).unwrap_or(min);
    if (max - min).abs() < f32::EPSILON {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// One candidate before merge: an item plus its raw keyword and/or vector
/// scores (either may be absent if it was found by only one pass).
pub struct Candidate {
    pub item: MemoryItem,
    pub vector_score: Option<f32>,
    pub keyword_score: Option<f32>,
}

/// Merge keyword and vector candidates into a single ranked, deduplicated
/// list. Ties broken by `updated_at` descending, then `id` lexicographically.
pub fn rank(candidates: Vec<Candidate>, weights: RankingWeights, now: DateTime<Utc>) -> Vec<RankedItem> {
    let vector_scores: Vec<f32> = candidates.iter().map(|c| c.vector_score.unwrap_or(0.0)).collect();
    let normalized_vector = normalize(&vector_scores);

    let mut ranked: Vec<RankedItem> = candidates
        .into_iter()
        .zip(normalized_vector)
        .map(|(candidate, norm_vector_score)| {
            let keyword_score = candidate.keyword_score.unwrap_or(0.0);
            let decay = age_decay(candidate.item.updated_at, now, weights.age_half_life_days);
            let score = weights.alpha * norm_vector_score + weights.beta * keyword_score - weights.gamma * decay;
            RankedItem { item: candidate.item, score }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.item.updated_at.cmp(&a.item.updated_at))
            .then_with(|| a.item.id.as_str().cmp(b.item.id.as_str()))
    });

    let mut seen = std::collections::HashSet::new();
    ranked.retain(|ranked_item| seen.insert(ranked_item.item.id.clone()));
    ranked
}
