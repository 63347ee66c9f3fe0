//! Pluggable embedding backend system
//!
//! - **Hashing backend**: deterministic feature hashing, no network
//! - **HTTP backend**: OpenAI-compatible APIs (OpenAI, Azure, LM Studio, vLLM, etc.)
//!
//! # Example Configuration
//!
//! ```toml
//! # Local LM Studio / vLLM
//! [embedding]
//! backend = "http"
//! endpoint = "http://localhost:1234/v1/embeddings"
//! model = "nomic-embed-text-v1.5"
//! dimensions = 768
//! # api_key from OPENAI_API_KEY env var
//! ```

mod factory;
mod hashing;
mod http;
mod traits;

pub use factory::create_embedder;
pub use hashing::HashingEmbedder;
pub use http::{HttpConfig, HttpEmbedder};
pub use traits::{Embedder, EmbeddingError, EmbeddingResult};
