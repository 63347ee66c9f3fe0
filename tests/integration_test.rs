//! Integration tests for techdoc
//!
//! These tests verify end-to-end ingestion and retrieval through the public API.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use techdoc::{
    chunking::Chunker,
    config::{ChunkingConfig, Config},
    embedding::{Embedder, EmbeddingError, EmbeddingResult, HashingEmbedder},
    index::{HybridIndex, IndexSettings},
    retrieval::{FusionStrategy, HybridIndexer, HybridRetriever, WeightedFusion},
    routing::DomainFilter,
    types::{Document, Embedding, RetrievalMethod},
    util::Cancellation,
    Error,
};
use tempfile::TempDir;

const DIMS: usize = 128;

const VOCABULARY: &[&str] = &[
    "sensor", "firmware", "latency", "cache", "thread", "mutex", "kernel", "packet", "router",
    "gradient", "tensor", "schema", "query", "index", "shard", "replica", "socket", "buffer",
    "compiler", "parser", "token", "vector", "lattice", "crystal", "enzyme", "protein",
    "naïve", "über", "façade", "circuit", "voltage", "battery",
];

/// Embedder whose provider is down
#[derive(Debug)]
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> EmbeddingResult<Embedding> {
        Err(EmbeddingError::Network("provider unavailable".into()))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Embedder that never answers in time
#[derive(Debug)]
struct SlowEmbedder;

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed(&self, _text: &str) -> EmbeddingResult<Embedding> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![0.0; DIMS])
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "slow"
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.dimensions = DIMS;
    config.embedding.max_retries = 1;
    config.embedding.initial_backoff_ms = 1;
    config.embedding.max_backoff_ms = 2;
    config.routing.detect_untagged = false;
    config
}

struct Pipeline {
    config: Config,
    index: Arc<HybridIndex>,
    indexer: HybridIndexer,
    retriever: HybridRetriever,
}

impl Pipeline {
    fn new(config: Config) -> Self {
        let index = Arc::new(HybridIndex::new(DIMS, IndexSettings::from_config(&config)));
        Self::with_index(config, index)
    }

    fn with_index(config: Config, index: Arc<HybridIndex>) -> Self {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMS));
        let indexer = HybridIndexer::new(index.clone(), embedder.clone(), &config).unwrap();
        let retriever = HybridRetriever::new(index.clone(), embedder, &config).unwrap();
        Self {
            config,
            index,
            indexer,
            retriever,
        }
    }

    fn retriever_with(&self, embedder: Arc<dyn Embedder>) -> HybridRetriever {
        HybridRetriever::new(self.index.clone(), embedder, &self.config).unwrap()
    }
}

fn random_text(rng: &mut StdRng, words: usize) -> String {
    let mut text = String::new();
    for i in 0..words {
        if i > 0 {
            text.push_str(match rng.gen_range(0..12) {
                0 => ". ",
                1 => ",  ",
                2 => "\n\n",
                3 => "! ",
                _ => " ",
            });
        }
        text.push_str(VOCABULARY[rng.gen_range(0..VOCABULARY.len())]);
    }
    if rng.gen_bool(0.5) {
        text.push('.');
    }
    text
}

/// Every character of every document belongs to at least one passage
#[test]
fn test_chunking_covers_every_character() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let chunk_size = rng.gen_range(1..40);
        let config = ChunkingConfig {
            chunk_size,
            overlap_fraction: rng.gen_range(0.0..0.9),
            min_chunk_size: rng.gen_range(1..=chunk_size),
            sentence_aware: rng.gen_bool(0.5),
            clean_text: false,
            domains: Default::default(),
        };
        let words = rng.gen_range(1..300);
        let text = random_text(&mut rng, words);
        let document = Document::new("doc", text.clone(), "x");

        let passages: Vec<_> = Chunker::new(config.clone()).chunk(&document).unwrap().collect();
        assert!(!passages.is_empty());

        let total = text.chars().count();
        let mut spans: Vec<_> = passages.iter().map(|p| p.span).collect();
        spans.sort_by_key(|s| s.start);

        assert_eq!(spans[0].start, 0, "config {:?}", config);
        let mut covered = 0;
        for span in &spans {
            assert!(span.start <= covered, "gap before {} with {:?}", span, config);
            covered = covered.max(span.end);
        }
        assert_eq!(covered, total, "config {:?}", config);

        for passage in &passages {
            let expected: String = text
                .chars()
                .skip(passage.span.start)
                .take(passage.span.len())
                .collect();
            assert_eq!(passage.text, expected);
            assert!(passage.token_count <= config.chunk_size);
        }
    }
}

/// Every passage is reachable from both sub-indexes
#[tokio::test]
async fn test_dual_index_consistency() {
    let mut config = test_config();
    config.chunking.chunk_size = 12;
    config.chunking.min_chunk_size = 4;
    let pipeline = Pipeline::new(config);
    let mut rng = StdRng::seed_from_u64(11);

    for i in 0..10 {
        let text = random_text(&mut rng, 40);
        pipeline
            .indexer
            .ingest(Document::new(format!("doc{}", i), text, "x"))
            .await
            .unwrap();
    }

    let state = pipeline.index.read();
    let passages = state.store().passages_sorted();
    let n = passages.len();
    assert!(n > 10);
    let cancel = Cancellation::new();

    for passage in passages {
        let vector = &state.vectors().get(&passage.id).unwrap().vector;
        let dense = state
            .dense_candidates(vector, &DomainFilter::All, n, &cancel)
            .unwrap();
        assert!(dense.iter().any(|h| h.passage_id == passage.id));

        let term = passage
            .text
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .unwrap();
        let lexical = state.lexical_candidates(term, &DomainFilter::All, n, &cancel);
        assert!(
            lexical.iter().any(|h| h.passage_id == passage.id),
            "{} not found for term {}",
            passage.id,
            term
        );
    }
    assert!(state.verify().is_empty());
}

/// Ingesting the same document twice changes nothing
#[tokio::test]
async fn test_idempotent_upsert() {
    let pipeline = Pipeline::new(test_config());
    let text = "Firmware updates over the air need a rollback partition. \
                The bootloader verifies the image signature before switching.";

    let first = pipeline
        .indexer
        .ingest(Document::new("ota", text, "iot"))
        .await
        .unwrap();
    let before = pipeline
        .retriever
        .retrieve("firmware rollback", None, 5, None)
        .await
        .unwrap();

    let second = pipeline
        .indexer
        .ingest(Document::new("ota", text, "iot"))
        .await
        .unwrap();
    let after = pipeline
        .retriever
        .retrieve("firmware rollback", None, 5, None)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(pipeline.index.stats().passages, first.len());
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.passage_id(), b.passage_id());
        assert!((a.fused_score - b.fused_score).abs() < 1e-6);
    }
}

/// A query restricted to a domain never returns passages from another one
#[tokio::test]
async fn test_domain_isolation() {
    let pipeline = Pipeline::new(test_config());
    let domains = ["iot", "ml_ai", "system_design", "physics"];
    let mut rng = StdRng::seed_from_u64(3);

    for i in 0..24 {
        let domain = domains[i % domains.len()];
        let text = random_text(&mut rng, 30);
        pipeline
            .indexer
            .ingest(Document::new(format!("doc{}", i), text, domain))
            .await
            .unwrap();
    }

    for _ in 0..20 {
        let query = random_text(&mut rng, 3);
        for domain in domains {
            let results = pipeline
                .retriever
                .retrieve(&query, Some(domain), 10, None)
                .await
                .unwrap();
            assert!(!results.is_empty());
            assert!(results.iter().all(|r| r.domain() == domain));
        }
    }
}

/// Random subset of `count` ids with integer scores, best first
fn random_ranking(rng: &mut StdRng, count: usize) -> Vec<(String, f32)> {
    let mut list = Vec::new();
    for i in 0..count {
        if rng.gen_bool(0.7) {
            list.push((format!("p{:02}", i), rng.gen_range(0..20) as f32));
        }
    }
    list.sort_by(|a, b| b.1.total_cmp(&a.1));
    list
}

/// Raising alpha never moves a passage below one it dominates on the dense signal
#[test]
fn test_fusion_monotonicity() {
    let mut rng = StdRng::seed_from_u64(5);
    let alphas = [0.0, 0.25, 0.5, 0.75, 1.0];

    for _ in 0..100 {
        let dense = random_ranking(&mut rng, 12);
        let lexical = random_ranking(&mut rng, 12);

        let orders: Vec<Vec<_>> = alphas
            .iter()
            .map(|&alpha| WeightedFusion { alpha }.fuse(&dense, &lexical))
            .collect();
        let signals = &orders[0];

        for a in signals {
            for b in signals {
                if !(a.dense_score > b.dense_score && a.lexical_score >= b.lexical_score) {
                    continue;
                }
                let mut was_ahead = false;
                for order in &orders {
                    let pos_a = order.iter().position(|c| c.passage_id == a.passage_id);
                    let pos_b = order.iter().position(|c| c.passage_id == b.passage_id);
                    let ahead = pos_a < pos_b;
                    assert!(
                        ahead || !was_ahead,
                        "{} fell behind {} as alpha grew",
                        a.passage_id,
                        b.passage_id
                    );
                    was_ahead = ahead;
                }
                assert!(was_ahead);
            }
        }
    }
}

/// Overlapping passages of one document never appear together
#[tokio::test]
async fn test_overlapping_passages_deduplicated() {
    let mut config = test_config();
    config.chunking.chunk_size = 10;
    config.chunking.overlap_fraction = 0.7;
    config.chunking.min_chunk_size = 2;
    config.chunking.sentence_aware = false;
    let threshold = config.retrieval.dedup_overlap_threshold;
    let pipeline = Pipeline::new(config);

    let text = (0..60)
        .map(|i| if i % 3 == 0 { "voltage" } else { VOCABULARY[i % 20] })
        .collect::<Vec<_>>()
        .join(" ");
    let ids = pipeline
        .indexer
        .ingest(Document::new("manual", text, "iot"))
        .await
        .unwrap();
    assert!(ids.len() > 5);

    let results = pipeline
        .retriever
        .retrieve("voltage", None, 20, None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.len() < ids.len());

    for (i, a) in results.iter().enumerate() {
        for b in &results[i + 1..] {
            if a.document_id() == b.document_id() {
                assert!(a.passage.span.overlap_ratio(&b.passage.span) < threshold);
            }
        }
    }
}

#[tokio::test]
async fn test_exact_match_scenario() {
    let pipeline = Pipeline::new(test_config());
    let text = "The boiling point of water is 100 degrees Celsius at sea level.";
    pipeline
        .indexer
        .ingest(Document::new("water", text, "physics"))
        .await
        .unwrap();

    let results = pipeline
        .retriever
        .retrieve("boiling point of water", None, 1, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id(), "water");
    assert_eq!(results[0].passage.text, text);
    assert_eq!(
        results[0].matched_by,
        vec![RetrievalMethod::Dense, RetrievalMethod::Lexical]
    );
}

#[tokio::test]
async fn test_multi_domain_no_leakage() {
    let pipeline = Pipeline::new(test_config());
    pipeline
        .indexer
        .ingest(Document::new(
            "solid-state",
            "The unit cell of a crystal lattice repeats in three dimensions.",
            "physics",
        ))
        .await
        .unwrap();
    pipeline
        .indexer
        .ingest(Document::new(
            "membranes",
            "The cell membrane controls what enters and leaves the cell.",
            "biology",
        ))
        .await
        .unwrap();

    let results = pipeline
        .retriever
        .retrieve("cell", Some("biology"), 5, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id(), "membranes");
    assert_eq!(results[0].domain(), "biology");

    // Domain tags are normalized on both sides
    let results = pipeline
        .retriever
        .retrieve("cell", Some(" Physics "), 5, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id(), "solid-state");
}

#[tokio::test]
async fn test_deletion_scenario() {
    let pipeline = Pipeline::new(test_config());
    pipeline
        .indexer
        .ingest(Document::new("qcd", "Gluons mediate the strong force between quarks.", "physics"))
        .await
        .unwrap();

    let before = pipeline.retriever.retrieve("gluons", None, 5, None).await.unwrap();
    assert_eq!(before.len(), 1);

    assert_eq!(pipeline.indexer.delete_document("qcd").await.unwrap(), 1);

    let after = pipeline.retriever.retrieve("gluons", None, 5, None).await.unwrap();
    assert!(after.is_empty());
    assert!(!pipeline.index.contains_document("qcd"));
    assert_eq!(pipeline.index.stats().vocabulary, 0);
}

#[tokio::test]
async fn test_deleted_document_never_returned() {
    let pipeline = Pipeline::new(test_config());
    pipeline
        .indexer
        .ingest(Document::new("qcd", "Gluons mediate the strong force between quarks.", "physics"))
        .await
        .unwrap();
    pipeline
        .indexer
        .ingest(Document::new("bread", "Sourdough needs a long cold proof.", "cooking"))
        .await
        .unwrap();

    pipeline.indexer.delete_document("qcd").await.unwrap();

    // The remaining document shares no terms with the query; it must not
    // surface through a zero-similarity dense hit
    let results = pipeline.retriever.retrieve("gluons", None, 5, None).await.unwrap();
    assert!(results.is_empty(), "unexpected results: {:?}", results);
}

#[tokio::test]
async fn test_graceful_degradation_on_embedding_failure() {
    let pipeline = Pipeline::new(test_config());
    pipeline
        .indexer
        .ingest(Document::new("mqtt", "MQTT brokers fan out messages to subscribers.", "iot"))
        .await
        .unwrap();
    pipeline
        .indexer
        .ingest(Document::new("coap", "CoAP runs over UDP for constrained devices.", "iot"))
        .await
        .unwrap();

    let retriever = pipeline.retriever_with(Arc::new(FailingEmbedder));
    let results = retriever.retrieve("mqtt subscribers", None, 5, None).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id(), "mqtt");
    assert_eq!(results[0].matched_by, vec![RetrievalMethod::Lexical]);
    assert_eq!(results[0].dense_score, 0.0);
}

#[tokio::test]
async fn test_deadline_returns_timeout() {
    let pipeline = Pipeline::new(test_config());
    pipeline
        .indexer
        .ingest(Document::new("doc", "anything at all", "x"))
        .await
        .unwrap();

    let retriever = pipeline.retriever_with(Arc::new(SlowEmbedder));
    let started = std::time::Instant::now();
    let err = retriever
        .retrieve("anything", None, 5, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetrievalTimeout { .. }));
    assert!(err.is_retryable());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_results() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index.json");

    let pipeline = Pipeline::new(test_config());
    let mut rng = StdRng::seed_from_u64(19);
    for i in 0..8 {
        let text = random_text(&mut rng, 50);
        pipeline
            .indexer
            .ingest(Document::new(format!("doc{}", i), text, "x"))
            .await
            .unwrap();
    }
    let before = pipeline
        .retriever
        .retrieve("kernel mutex latency", None, 5, None)
        .await
        .unwrap();
    pipeline.index.save(&path).unwrap();

    let loaded = Arc::new(HybridIndex::load(&path).unwrap());
    let restored = Pipeline::with_index(test_config(), loaded);
    let after = restored
        .retriever
        .retrieve("kernel mutex latency", None, 5, None)
        .await
        .unwrap();

    assert_eq!(restored.index.stats().passages, pipeline.index.stats().passages);
    let before_ids: Vec<&str> = before.iter().map(|r| r.passage_id()).collect();
    let after_ids: Vec<&str> = after.iter().map(|r| r.passage_id()).collect();
    assert_eq!(before_ids, after_ids);
}

#[tokio::test]
async fn test_batch_ingest_reports_per_document() {
    let pipeline = Pipeline::new(test_config());
    let report = pipeline
        .indexer
        .ingest_batch(vec![
            Document::new("a", "Consistent hashing spreads keys across shards.", "system_design"),
            Document::new("empty", "   \n\t ", "system_design"),
            Document::new("", "text without an id", "system_design"),
            Document::new("b", "Leader election needs a quorum.", "system_design"),
        ])
        .await;

    assert_eq!(report.ingested.len(), 2);
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .all(|(_, e)| matches!(e, Error::InvalidDocument { .. })));
    assert_eq!(pipeline.index.stats().documents, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_and_retrieve() {
    let pipeline = Arc::new(Pipeline::new(test_config()));
    let mut rng = StdRng::seed_from_u64(23);
    let texts: Vec<String> = (0..20).map(|_| random_text(&mut rng, 60)).collect();

    let writer = {
        let pipeline = pipeline.clone();
        let texts = texts.clone();
        tokio::spawn(async move {
            for round in 0..3 {
                for (i, text) in texts.iter().enumerate() {
                    let doc = Document::new(format!("doc{}", i), text.clone(), "x");
                    pipeline.indexer.ingest(doc).await.unwrap();
                    if round == 1 && i % 4 == 0 {
                        let id = format!("doc{}", i);
                        pipeline.indexer.delete_document(&id).await.unwrap();
                    }
                }
            }
        })
    };

    let mut readers = Vec::new();
    for r in 0..4 {
        let pipeline = pipeline.clone();
        readers.push(tokio::spawn(async move {
            for q in 0..15 {
                let query = VOCABULARY[(r * 7 + q) % VOCABULARY.len()];
                let results = pipeline.retriever.retrieve(query, None, 5, None).await.unwrap();
                assert!(results.len() <= 5);
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(pipeline.index.verify().is_empty());
    assert_eq!(pipeline.index.stats().documents, 20);
}
