//! Hybrid retrieval system
//!
//! Combines:
//! - Dense vector search (exact scan or HNSW)
//! - BM25 lexical search
//! - Weighted min-max fusion or Reciprocal Rank Fusion (RRF)
//! - Same-document overlap deduplication

mod context;
mod dedup;
mod fusion;
mod hybrid;
mod reranker;

pub use context::*;
pub use dedup::*;
pub use fusion::*;
pub use hybrid::*;
pub use reranker::*;
