//! Result fusion strategies
//!
//! Combines the dense and lexical candidate lists into one scored list.
//! Two policies are available behind [`FusionStrategy`]:
//! - weighted sum of min-max normalized scores (default)
//! - Reciprocal Rank Fusion (RRF)

use crate::config::{FusionMethod, RetrievalConfig};
use crate::types::PassageId;
use std::collections::HashMap;
use std::fmt::Debug;

/// A candidate after fusion
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub passage_id: PassageId,
    /// Min-max normalized dense score (0 when the dense list missed it)
    pub dense_score: f32,
    /// Min-max normalized lexical score (0 when the lexical list missed it)
    pub lexical_score: f32,
    pub fused_score: f32,
    pub raw_dense: Option<f32>,
    pub raw_lexical: Option<f32>,
    /// 1-indexed ranks within each input list
    pub dense_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

/// Fusion policy; swapping it does not change the retriever's contract
pub trait FusionStrategy: Send + Sync + Debug {
    /// Fuse two ranked lists of `(passage_id, raw_score)`, each ordered best first.
    ///
    /// Either list may be empty. Output is ordered by fused score descending,
    /// then passage id ascending.
    fn fuse(&self, dense: &[(PassageId, f32)], lexical: &[(PassageId, f32)]) -> Vec<FusedCandidate>;

    fn name(&self) -> &str;
}

/// `fused = alpha * norm_dense + (1 - alpha) * norm_lexical`
#[derive(Debug, Clone)]
pub struct WeightedFusion {
    pub alpha: f32,
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

impl FusionStrategy for WeightedFusion {
    fn fuse(&self, dense: &[(PassageId, f32)], lexical: &[(PassageId, f32)]) -> Vec<FusedCandidate> {
        let alpha = self.alpha.clamp(0.0, 1.0);
        let mut candidates = merge(dense, lexical);
        for candidate in candidates.iter_mut() {
            candidate.fused_score =
                alpha * candidate.dense_score + (1.0 - alpha) * candidate.lexical_score;
        }
        sort_fused(&mut candidates);
        candidates
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// Reciprocal Rank Fusion parameters
///
/// RRF score = sum of 1/(k + rank) over the lists containing the passage.
/// Works on ranks rather than scores, so no calibration is needed across
/// heterogeneous retrieval methods.
#[derive(Debug, Clone)]
pub struct ReciprocalRankFusion {
    pub k: usize,
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self { k: 60 }
    }
}

impl FusionStrategy for ReciprocalRankFusion {
    fn fuse(&self, dense: &[(PassageId, f32)], lexical: &[(PassageId, f32)]) -> Vec<FusedCandidate> {
        let k = self.k as f32;
        let mut candidates = merge(dense, lexical);
        for candidate in candidates.iter_mut() {
            candidate.fused_score = [candidate.dense_rank, candidate.lexical_rank]
                .into_iter()
                .flatten()
                .map(|rank| 1.0 / (k + rank as f32))
                .sum();
        }
        sort_fused(&mut candidates);
        candidates
    }

    fn name(&self) -> &str {
        "rrf"
    }
}

/// Build the configured fusion strategy
pub fn create_fusion(config: &RetrievalConfig) -> Box<dyn FusionStrategy> {
    match config.fusion {
        FusionMethod::Weighted => Box::new(WeightedFusion {
            alpha: config.alpha,
        }),
        FusionMethod::Rrf => Box::new(ReciprocalRankFusion { k: config.rrf_k }),
    }
}

/// Min-max scale scores to [0, 1].
///
/// A constant (or single-item) list maps to 1.0 when its score is positive
/// and to 0.0 otherwise, so a lone zero-similarity hit never looks like a match.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let max_score = scores.iter().copied().fold(f32::MIN, f32::max);
    let min_score = scores.iter().copied().fold(f32::MAX, f32::min);
    let range = max_score - min_score;

    scores
        .iter()
        .map(|&s| {
            if range > 0.0 {
                (s - min_score) / range
            } else if s > 0.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Union of both lists with normalized scores and ranks; fused score left at 0
fn merge(dense: &[(PassageId, f32)], lexical: &[(PassageId, f32)]) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<&PassageId, FusedCandidate> = HashMap::new();

    let dense_norm = min_max_normalize(&dense.iter().map(|(_, s)| *s).collect::<Vec<_>>());
    for (rank, ((id, raw), norm)) in dense.iter().zip(dense_norm).enumerate() {
        let candidate = by_id.entry(id).or_insert_with(|| empty_candidate(id));
        if candidate.dense_rank.is_none() {
            candidate.dense_score = norm;
            candidate.raw_dense = Some(*raw);
            candidate.dense_rank = Some(rank + 1);
        }
    }

    let lexical_norm = min_max_normalize(&lexical.iter().map(|(_, s)| *s).collect::<Vec<_>>());
    for (rank, ((id, raw), norm)) in lexical.iter().zip(lexical_norm).enumerate() {
        let candidate = by_id.entry(id).or_insert_with(|| empty_candidate(id));
        if candidate.lexical_rank.is_none() {
            candidate.lexical_score = norm;
            candidate.raw_lexical = Some(*raw);
            candidate.lexical_rank = Some(rank + 1);
        }
    }

    by_id.into_values().collect()
}

fn empty_candidate(id: &PassageId) -> FusedCandidate {
    FusedCandidate {
        passage_id: id.clone(),
        dense_score: 0.0,
        lexical_score: 0.0,
        fused_score: 0.0,
        raw_dense: None,
        raw_lexical: None,
        dense_rank: None,
        lexical_rank: None,
    }
}

fn sort_fused(candidates: &mut [FusedCandidate]) {
    candidates.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.passage_id.cmp(&b.passage_id))
    });
}
