//! Backend factory for creating embedding backends from configuration

use super::hashing::HashingEmbedder;
use super::http::{HttpConfig, HttpEmbedder};
use super::traits::{Embedder, EmbeddingResult};
use crate::config::{BackendKind, EmbeddingConfig};
use std::sync::Arc;
use tracing::info;

/// Create an embedding backend from configuration
///
/// Returns an `Arc<dyn Embedder>` that can be shared across tasks.
pub fn create_embedder(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn Embedder>> {
    match config.backend {
        BackendKind::Http => {
            info!("Creating HTTP embedding backend: endpoint={}", config.endpoint);
            let backend = HttpEmbedder::new(HttpConfig::from(config))?;
            Ok(Arc::new(backend))
        }
        BackendKind::Hashing => {
            info!(
                "Creating hashing embedding backend: {} dimensions",
                config.dimensions
            );
            Ok(Arc::new(HashingEmbedder::new(config.dimensions)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_http_backend() {
        let config = EmbeddingConfig {
            backend: BackendKind::Http,
            endpoint: "http://localhost:8080/v1/embeddings".to_string(),
            model: "test-model".to_string(),
            dimensions: 384,
            ..Default::default()
        };

        // Only builds the client, no request is made
        let backend = create_embedder(&config).unwrap();
        assert_eq!(backend.name(), "http");
        assert_eq!(backend.dimensions(), 384);
    }

    #[test]
    fn test_create_hashing_backend() {
        let config = EmbeddingConfig {
            dimensions: 128,
            ..Default::default()
        };
        let backend = create_embedder(&config).unwrap();
        assert_eq!(backend.name(), "hashing");
        assert_eq!(backend.dimensions(), 128);
    }
}
