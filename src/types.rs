//! Core types for the retrieval core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a document
pub type DocumentId = String;

/// Unique identifier for a passage (`{document_id}#{char_offset}`)
pub type PassageId = String;

/// Domain label partitioning the corpus
pub type Domain = String;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Build the stable identifier of a passage starting at `char_offset`
pub fn passage_id(document_id: &str, char_offset: usize) -> PassageId {
    format!("{}#{}", document_id, char_offset)
}

/// Normalize a domain tag: trimmed and lowercased
pub fn normalize_domain(domain: &str) -> Domain {
    domain.trim().to_lowercase()
}

/// A raw source document submitted for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    /// Domain tag; empty means untagged
    pub domain: Domain,
    pub title: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>, domain: impl Into<Domain>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            domain: domain.into(),
            title: None,
        }
    }

    /// A document whose domain will be detected at ingestion
    pub fn untagged(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self::new(id, text, "")
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_tagged(&self) -> bool {
        !self.domain.trim().is_empty()
    }
}

/// Half-open character range `[start, end)` within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of characters shared with `other`
    pub fn intersection(&self, other: &CharSpan) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    /// Shared characters as a fraction of the shorter span
    pub fn overlap_ratio(&self, other: &CharSpan) -> f32 {
        let shorter = self.len().min(other.len());
        if shorter == 0 {
            return 0.0;
        }
        self.intersection(other) as f32 / shorter as f32
    }
}

impl fmt::Display for CharSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A contiguous slice of a document: the minimal retrievable unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub document_id: DocumentId,
    /// Inherited from the parent document, never changed afterwards
    pub domain: Domain,
    pub span: CharSpan,
    /// Position of the passage within its document
    pub ordinal: usize,
    pub token_count: usize,
    pub text: String,
    /// Dense vector, populated after embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    pub ingested_at: DateTime<Utc>,
}

/// Which retrieval signal contributed to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Dense,
    Lexical,
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => f.write_str("dense"),
            Self::Lexical => f.write_str("lexical"),
        }
    }
}

/// A passage scored for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// Normalized dense signal in [0, 1] (0 when the dense list missed it)
    pub dense_score: f32,
    /// Normalized lexical signal in [0, 1] (0 when the lexical list missed it)
    pub lexical_score: f32,
    pub fused_score: f32,
    /// Raw cosine/L2 similarity, when the dense list contained the passage
    pub raw_dense: Option<f32>,
    /// Raw BM25 score, when the lexical list contained the passage
    pub raw_lexical: Option<f32>,
    pub matched_by: Vec<RetrievalMethod>,
}

impl ScoredPassage {
    pub fn passage_id(&self) -> &str {
        &self.passage.id
    }

    pub fn document_id(&self) -> &str {
        &self.passage.document_id
    }

    pub fn domain(&self) -> &str {
        &self.passage.domain
    }
}
