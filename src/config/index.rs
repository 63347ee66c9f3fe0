//! Index, chunking, and retrieval configuration

use crate::types::normalize_domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Similarity metric for the vector index, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
    L2,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Similarity metric (cosine recommended for normalized embeddings)
    pub metric: SimilarityMetric,
    /// Below this many vectors queries always use the exact linear scan
    pub brute_force_threshold: usize,
    /// HNSW M parameter (connections per layer)
    pub hnsw_m: usize,
    /// HNSW ef_construction parameter
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search parameter
    pub hnsw_ef_search: usize,
    /// Minimum recall@k of the HNSW graph against the exact scan
    pub recall_floor: f32,
    /// Number of stored vectors sampled for the recall check
    pub recall_sample_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::Cosine,
            brute_force_threshold: 10_000,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
            recall_floor: 0.9,
            recall_sample_size: 32,
        }
    }
}

/// Lexical (BM25) index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
    /// Apply the light English suffix stemmer to indexed and query terms
    pub stemming: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            stemming: true,
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum passage size in tokens
    pub chunk_size: usize,
    /// Overlap between adjacent passages (as fraction of chunk_size, e.g. 0.2)
    pub overlap_fraction: f32,
    /// Minimum passage size in tokens (documents shorter than this yield one passage)
    pub min_chunk_size: usize,
    /// Prefer ending passages on sentence boundaries
    pub sentence_aware: bool,
    /// Strip e-mails, phone numbers, URLs and redundant whitespace before chunking
    pub clean_text: bool,
    /// Per-domain size overrides, keyed by domain tag (`[chunking.domains.iot]`)
    pub domains: BTreeMap<String, DomainChunking>,
}

/// Chunk sizing for one domain; unset fields fall back to the global values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainChunking {
    pub chunk_size: Option<usize>,
    pub overlap_fraction: Option<f32>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap_fraction: 0.2,
            min_chunk_size: 20,
            sentence_aware: true,
            clean_text: false,
            domains: BTreeMap::new(),
        }
    }
}

impl ChunkingConfig {
    /// Effective chunking for `domain`, with its overrides applied
    pub fn for_domain(&self, domain: &str) -> ChunkingConfig {
        let mut config = ChunkingConfig {
            domains: BTreeMap::new(),
            ..self.clone()
        };
        if let Some(overrides) = self.domain_overrides(domain) {
            if let Some(chunk_size) = overrides.chunk_size {
                config.chunk_size = chunk_size;
                config.min_chunk_size = config.min_chunk_size.min(chunk_size);
            }
            if let Some(overlap_fraction) = overrides.overlap_fraction {
                config.overlap_fraction = overlap_fraction;
            }
        }
        config
    }

    fn domain_overrides(&self, domain: &str) -> Option<&DomainChunking> {
        let domain = normalize_domain(domain);
        self.domains
            .iter()
            .find(|(tag, _)| normalize_domain(tag) == domain)
            .map(|(_, overrides)| overrides)
    }

    /// Overlap between adjacent passages in tokens
    pub fn overlap_tokens(&self) -> usize {
        let overlap = (self.chunk_size as f32 * self.overlap_fraction).round() as usize;
        overlap.min(self.chunk_size.saturating_sub(1))
    }

    /// Distance in tokens between the starts of adjacent passages
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap_tokens()).max(1)
    }
}

/// Score fusion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Min-max normalized weighted sum
    Weighted,
    /// Reciprocal Rank Fusion
    Rrf,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub fusion: FusionMethod,
    /// Dense weight for weighted fusion (lexical gets 1 - alpha)
    pub alpha: f32,
    /// RRF k parameter
    pub rrf_k: usize,
    /// Candidates fetched per sub-index = max(k * overfetch_multiplier, min_candidates)
    pub overfetch_multiplier: usize,
    pub min_candidates: usize,
    /// Dense hits at or below this similarity are discarded before fusion
    pub min_dense_similarity: f32,
    /// Same-document passages overlapping at least this fraction are collapsed
    pub dedup_overlap_threshold: f32,
    /// Default caller deadline for a retrieval
    pub query_timeout_ms: u64,
    /// How long to wait for each sub-index before proceeding without it
    pub subquery_timeout_ms: u64,
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fusion: FusionMethod::Weighted,
            alpha: 0.5,
            rrf_k: 60,
            overfetch_multiplier: 4,
            min_candidates: 50,
            min_dense_similarity: 0.0,
            dedup_overlap_threshold: 0.5,
            query_timeout_ms: 5_000,
            subquery_timeout_ms: 2_000,
            default_top_k: 5,
        }
    }
}

impl RetrievalConfig {
    /// Number of candidates to request from each sub-index for a top-k query
    pub fn candidate_count(&self, k: usize) -> usize {
        k.saturating_mul(self.overfetch_multiplier).max(self.min_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_and_stride() {
        let config = ChunkingConfig::default();
        assert_eq!(config.overlap_tokens(), 40);
        assert_eq!(config.stride(), 160);

        let degenerate = ChunkingConfig {
            chunk_size: 1,
            overlap_fraction: 0.9,
            ..Default::default()
        };
        assert_eq!(degenerate.overlap_tokens(), 0);
        assert_eq!(degenerate.stride(), 1);
    }

    #[test]
    fn test_domain_overrides() {
        let mut config = ChunkingConfig::default();
        config.domains.insert(
            "system_design".to_string(),
            DomainChunking {
                chunk_size: Some(400),
                overlap_fraction: None,
            },
        );
        config.domains.insert(
            "IoT".to_string(),
            DomainChunking {
                chunk_size: Some(10),
                overlap_fraction: Some(0.5),
            },
        );

        let design = config.for_domain("system_design");
        assert_eq!(design.chunk_size, 400);
        assert_eq!(design.overlap_fraction, 0.2);
        assert!(design.domains.is_empty());

        let iot = config.for_domain("iot");
        assert_eq!(iot.chunk_size, 10);
        assert_eq!(iot.min_chunk_size, 10);
        assert_eq!(iot.overlap_tokens(), 5);

        assert_eq!(config.for_domain("general").chunk_size, 200);
    }

    #[test]
    fn test_candidate_count() {
        let config = RetrievalConfig::default();
        assert_eq!(config.candidate_count(5), 50);
        assert_eq!(config.candidate_count(20), 80);
    }
}
