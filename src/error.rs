//! Error taxonomy for the retrieval core

use crate::embedding::EmbeddingError;
use crate::types::{DocumentId, PassageId};
use std::time::Duration;

/// Errors surfaced by ingestion, retrieval, and index maintenance
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or empty input at ingestion; never retried
    #[error("Invalid document '{document_id}': {reason}")]
    InvalidDocument {
        document_id: DocumentId,
        reason: String,
    },

    /// Non-transient failure from the embedding provider
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(#[from] EmbeddingError),

    /// A passage was found in one sub-index but not the other (or not in the store)
    #[error("Index corruption for passage '{passage_id}': {detail}")]
    IndexCorruption {
        passage_id: PassageId,
        detail: String,
    },

    /// Caller deadline exceeded
    #[error("Retrieval timed out after {elapsed:?}")]
    RetrievalTimeout { elapsed: Duration },

    /// Embedding retries exhausted, or no signal was available to answer the query
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Vector length does not match the index dimensions
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Snapshot file is malformed, from another format version, or fails its checksum
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Approximate nearest-neighbor graph failure
    #[error("ANN index error: {0}")]
    Ann(String),

    /// A blocking index task panicked or was cancelled
    #[error("Index task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_document(document_id: impl Into<DocumentId>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            document_id: document_id.into(),
            reason: reason.into(),
        }
    }

    pub fn corruption(passage_id: impl Into<PassageId>, detail: impl Into<String>) -> Self {
        Self::IndexCorruption {
            passage_id: passage_id.into(),
            detail: detail.into(),
        }
    }

    /// Whether the caller may reasonably retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetrievalUnavailable(_) | Self::RetrievalTimeout { .. })
    }
}

/// Result type for the retrieval core
pub type Result<T> = std::result::Result<T, Error>;
