//! Keyword-overlap reranking for callers without a cross-encoder

use super::dedup::rank_order;
use crate::types::ScoredPassage;
use std::collections::HashSet;

pub struct SimpleReranker;

impl SimpleReranker {
    /// Rerank using a simple heuristic (query term overlap)
    pub fn rerank(query: &str, results: &mut [ScoredPassage]) {
        let query_lower = query.to_lowercase();
        let query_terms: HashSet<&str> = query_lower.split_whitespace().collect();

        for result in results.iter_mut() {
            let content_lower = result.passage.text.to_lowercase();
            let overlap = query_terms
                .iter()
                .filter(|term| content_lower.contains(*term))
                .count();

            let overlap_boost = overlap as f32 / query_terms.len().max(1) as f32;
            result.fused_score = result.fused_score * 0.7 + overlap_boost * 0.3;
        }

        results.sort_by(rank_order);
    }
}
