//! Embedding backend configuration

use serde::{Deserialize, Serialize};

/// Which embedding provider to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic feature-hashed bag of words (offline)
    Hashing,
    /// OpenAI-compatible HTTP endpoint
    ///
    /// Works with: OpenAI API, Azure OpenAI, LM Studio, vLLM,
    /// Ollama (OpenAI compat mode), text-embeddings-inference
    Http,
}

/// Embedding provider configuration
///
/// ```toml
/// [embedding]
/// backend = "http"
/// endpoint = "http://localhost:1234/v1/embeddings"
/// model = "bge-small-en-v1.5"
/// dimensions = 384
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: BackendKind,
    /// Embedding dimensions
    pub dimensions: usize,
    /// HTTP backend: API endpoint URL
    pub endpoint: String,
    /// HTTP backend: model name sent with each request
    pub model: String,
    /// HTTP backend: API key (optional, can also use OPENAI_API_KEY env var)
    pub api_key: Option<String>,
    /// HTTP backend: request timeout in seconds
    pub timeout_secs: u64,
    /// HTTP backend: maximum texts per request
    pub max_batch_size: usize,
    /// Retries for transient provider failures
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Hashing,
            dimensions: 384,
            endpoint: "http://localhost:1234/v1/embeddings".to_string(),
            model: "bge-small-en-v1.5".to_string(),
            api_key: None,
            timeout_secs: 30,
            max_batch_size: 64,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}
