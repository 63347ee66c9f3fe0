//! Ranking order and near-duplicate removal for scored passages

use crate::types::{CharSpan, ScoredPassage};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Final result order: fused score descending, then newest ingestion first,
/// then passage id ascending
pub fn rank_order(a: &ScoredPassage, b: &ScoredPassage) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| b.passage.ingested_at.cmp(&a.passage.ingested_at))
        .then_with(|| a.passage.id.cmp(&b.passage.id))
}

/// Drop passages that overlap an earlier (better-ranked) passage of the same
/// document by at least `threshold` of the shorter span.
///
/// Expects `ranked` in final order. Disjoint passages are never merged.
pub fn deduplicate(ranked: Vec<ScoredPassage>, threshold: f32) -> Vec<ScoredPassage> {
    let mut kept_spans: HashMap<String, Vec<CharSpan>> = HashMap::new();
    let mut kept = Vec::with_capacity(ranked.len());

    for candidate in ranked {
        let spans = kept_spans
            .entry(candidate.passage.document_id.clone())
            .or_default();
        let duplicate = spans.iter().any(|span| {
            let ratio = span.overlap_ratio(&candidate.passage.span);
            ratio > 0.0 && ratio >= threshold
        });
        if duplicate {
            continue;
        }
        spans.push(candidate.passage.span);
        kept.push(candidate);
    }

    kept
}
