//! Offline embedding backend based on feature hashing
//!
//! Each lowercased word is hashed into one of `dimensions` buckets with a
//! hash-derived sign; the bag is L2-normalized. Texts that share words get
//! a positive cosine similarity, which is enough for tests and for running
//! without an embedding server.

use super::traits::{Embedder, EmbeddingResult};
use crate::types::Embedding;
use crate::util::normalize;
use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.unicode_words() {
            let hash = xxh3_64(word.to_lowercase().as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Embedding> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{cosine_similarity, l2_norm};

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_sync("The boiling point of water");
        let b = embedder.embed_sync("The boiling point of water");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((l2_norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_are_similar() {
        let embedder = HashingEmbedder::new(256);
        let doc = embedder.embed_sync("The boiling point of water is 100 degrees Celsius");
        let query = embedder.embed_sync("boiling point of water");
        let other = embedder.embed_sync("GPIO pins on a microcontroller");
        assert!(cosine_similarity(&doc, &query) > cosine_similarity(&doc, &other));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed_sync("...").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[1], embedder.embed("gamma").await.unwrap());
    }
}
