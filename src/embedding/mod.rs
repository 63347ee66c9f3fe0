//! Embedding provider with pluggable backends
//!
//! Supports a deterministic hashing backend and OpenAI-compatible HTTP APIs:
//! - OpenAI, Azure OpenAI
//! - vLLM, Ollama, LM Studio
//! - text-embeddings-inference
//!
//! # Example Configuration
//!
//! ## OpenAI API
//! ```toml
//! [embedding]
//! backend = "http"
//! endpoint = "https://api.openai.com/v1/embeddings"
//! model = "text-embedding-3-small"
//! dimensions = 1536
//! ```
//!
//! ## Offline
//! ```toml
//! [embedding]
//! backend = "hashing"
//! dimensions = 384
//! ```

pub mod backend;
mod retry;

pub use backend::{
    create_embedder, Embedder, EmbeddingError, EmbeddingResult, HashingEmbedder, HttpConfig,
    HttpEmbedder,
};
pub use retry::{embed_batch_with_retry, embed_with_retry, RetryPolicy};
