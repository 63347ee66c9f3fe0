//! techdoc: hybrid retrieval core for multi-domain RAG assistants
//!
//! Turns technical documents into searchable passages and answers queries
//! with a fused dense + lexical ranking, featuring:
//! - Overlapping, sentence-aware chunking with full text coverage
//! - Pluggable embedding backends (OpenAI-compatible HTTP, offline hashing)
//! - Vector indexing with an exact scan or USearch (HNSW) above a size threshold
//! - In-memory BM25 with exact statistics under deletion
//! - Weighted min-max or RRF fusion, overlap dedup, deterministic tie-breaks
//! - Domain-scoped retrieval with no cross-domain leakage
//! - Self-describing, checksummed index snapshots

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod retrieval;
pub mod routing;
pub mod types;
pub mod util;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
