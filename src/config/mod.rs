//! Configuration for the retrieval core

mod embedding;
mod index;
mod logging;
mod routing;

pub use embedding::{BackendKind, EmbeddingConfig};
pub use index::{
    ChunkingConfig, DomainChunking, FusionMethod, IndexConfig, LexicalConfig, RetrievalConfig,
    SimilarityMetric,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use routing::RoutingConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration; every section falls back to its defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// BM25 configuration
    #[serde(default)]
    pub lexical: LexicalConfig,
    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Domain routing configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML (used by `init-config`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Embedding validation
        if self.embedding.dimensions == 0 {
            errors.push("embedding dimensions must be positive".to_string());
        }
        if self.embedding.dimensions > 4096 {
            errors.push("embedding dimensions must be <= 4096".to_string());
        }
        if self.embedding.max_batch_size == 0 {
            errors.push("max_batch_size must be positive".to_string());
        }
        if self.embedding.backend == BackendKind::Http && self.embedding.endpoint.trim().is_empty() {
            errors.push("http embedding backend requires an endpoint".to_string());
        }

        // Chunking validation
        if self.chunking.chunk_size == 0 {
            errors.push("chunk_size must be positive".to_string());
        }
        if self.chunking.chunk_size > 8192 {
            errors.push("chunk_size must be <= 8192".to_string());
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_fraction) {
            errors.push("overlap_fraction must be in [0.0, 1.0)".to_string());
        }
        if self.chunking.min_chunk_size > self.chunking.chunk_size {
            errors.push("min_chunk_size must not exceed chunk_size".to_string());
        }
        for (domain, chunking) in &self.chunking.domains {
            if chunking.chunk_size == Some(0) {
                errors.push(format!("chunking.domains.{}: chunk_size must be positive", domain));
            }
            if chunking.chunk_size.is_some_and(|size| size > 8192) {
                errors.push(format!("chunking.domains.{}: chunk_size must be <= 8192", domain));
            }
            if chunking
                .overlap_fraction
                .is_some_and(|overlap| !(0.0..1.0).contains(&overlap))
            {
                errors.push(format!(
                    "chunking.domains.{}: overlap_fraction must be in [0.0, 1.0)",
                    domain
                ));
            }
        }

        // Lexical validation
        if self.lexical.k1 < 0.0 {
            errors.push("k1 must be non-negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.lexical.b) {
            errors.push("b must be between 0.0 and 1.0".to_string());
        }

        // Retrieval validation
        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            errors.push("alpha must be between 0.0 and 1.0".to_string());
        }
        if self.retrieval.rrf_k == 0 {
            errors.push("rrf_k must be positive".to_string());
        }
        if self.retrieval.overfetch_multiplier == 0 {
            errors.push("overfetch_multiplier must be positive".to_string());
        }
        if !(-1.0..1.0).contains(&self.retrieval.min_dense_similarity) {
            errors.push("min_dense_similarity must be in [-1.0, 1.0)".to_string());
        }
        if !(0.0..=1.0).contains(&self.retrieval.dedup_overlap_threshold) {
            errors.push("dedup_overlap_threshold must be between 0.0 and 1.0".to_string());
        }
        if self.retrieval.query_timeout_ms == 0 {
            errors.push("query_timeout_ms must be positive".to_string());
        }
        if self.retrieval.subquery_timeout_ms == 0 {
            errors.push("subquery_timeout_ms must be positive".to_string());
        }

        // Index validation
        if self.index.hnsw_ef_construction == 0 {
            errors.push("ef_construction must be positive".to_string());
        }
        if self.index.hnsw_ef_search == 0 {
            errors.push("ef_search must be positive".to_string());
        }
        if self.index.hnsw_m == 0 {
            errors.push("HNSW M parameter must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.index.recall_floor) {
            errors.push("recall_floor must be between 0.0 and 1.0".to_string());
        }

        // Routing validation
        if self.routing.default_domain.trim().is_empty() {
            errors.push("default_domain must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
