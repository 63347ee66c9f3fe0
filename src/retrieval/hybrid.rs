//! Hybrid retrieval combining dense and lexical search

use super::dedup::{deduplicate, rank_order};
use super::fusion::{create_fusion, FusionStrategy};
use crate::chunking::{Chunker, TextCleaner};
use crate::config::{Config, RetrievalConfig};
use crate::embedding::{
    embed_batch_with_retry, embed_with_retry, Embedder, EmbeddingError, RetryPolicy,
};
use crate::error::{Error, Result};
use crate::index::{HybridIndex, IndexState};
use crate::routing::{DomainFilter, DomainRouter};
use crate::types::{
    normalize_domain, Document, DocumentId, Domain, Passage, PassageId, RetrievalMethod,
    ScoredPassage,
};
use crate::util::{truncate_str, Cancellation};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Resolved sub-index hits: passage and raw score, best first
type Hits = Vec<(Passage, f32)>;

/// Map an embedding failure that survived retries onto the core taxonomy
fn provider_error(err: EmbeddingError) -> Error {
    if err.is_transient() {
        Error::RetrievalUnavailable(format!("embedding provider: {}", err))
    } else {
        Error::EmbeddingProvider(err)
    }
}

fn check_dimensions(index: &HybridIndex, embedder: &dyn Embedder) -> Result<()> {
    if embedder.dimensions() != index.dimensions() {
        return Err(Error::DimensionMismatch {
            expected: index.dimensions(),
            actual: embedder.dimensions(),
        });
    }
    Ok(())
}

/// Outcome of a batch ingest; one failing document never aborts the rest
#[derive(Debug, Default)]
pub struct BatchReport {
    pub ingested: Vec<(DocumentId, Vec<PassageId>)>,
    pub failed: Vec<(DocumentId, Error)>,
}

impl BatchReport {
    pub fn passage_count(&self) -> usize {
        self.ingested.iter().map(|(_, ids)| ids.len()).sum()
    }
}

/// Ingestion path: chunk, embed, and index documents
pub struct HybridIndexer {
    index: Arc<HybridIndex>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    domain_chunkers: HashMap<Domain, Chunker>,
    router: DomainRouter,
    retry: RetryPolicy,
    clean_text: bool,
}

impl HybridIndexer {
    /// Create a new hybrid indexer
    pub fn new(index: Arc<HybridIndex>, embedder: Arc<dyn Embedder>, config: &Config) -> Result<Self> {
        check_dimensions(&index, embedder.as_ref())?;
        let chunking = &index.settings().chunking;
        let domain_chunkers = chunking
            .domains
            .keys()
            .map(|tag| (normalize_domain(tag), Chunker::new(chunking.for_domain(tag))))
            .collect();
        Ok(Self {
            chunker: Chunker::new(chunking.clone()),
            domain_chunkers,
            router: DomainRouter::new(&config.routing),
            retry: RetryPolicy::from(&config.embedding),
            clean_text: index.settings().chunking.clean_text,
            index,
            embedder,
        })
    }

    pub fn index(&self) -> &Arc<HybridIndex> {
        &self.index
    }

    /// Chunker sized for `domain`, falling back to the global settings
    fn chunker_for(&self, domain: &str) -> &Chunker {
        self.domain_chunkers.get(domain).unwrap_or(&self.chunker)
    }

    /// Index a document, replacing any earlier version with the same id.
    ///
    /// Embedding completes before the index write lock is taken.
    pub async fn ingest(&self, mut document: Document) -> Result<Vec<PassageId>> {
        if self.clean_text {
            document.text = TextCleaner::clean(&document.text);
        }
        document.domain = self.router.assign(&document);

        let mut passages: Vec<Passage> = self
            .chunker_for(&document.domain)
            .chunk(&document)?
            .collect();
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();

        let embeddings = embed_batch_with_retry(self.embedder.as_ref(), &self.retry, &texts)
            .await
            .map_err(provider_error)?;
        if embeddings.len() != passages.len() {
            return Err(Error::EmbeddingProvider(EmbeddingError::EmbeddingFailed(
                format!(
                    "expected {} embeddings, got {}",
                    passages.len(),
                    embeddings.len()
                ),
            )));
        }
        for (passage, embedding) in passages.iter_mut().zip(embeddings) {
            passage.embedding = Some(embedding);
        }

        let index = Arc::clone(&self.index);
        let document_id = document.id.clone();
        let ids =
            tokio::task::spawn_blocking(move || index.replace_document(&document_id, passages))
                .await??;
        info!(
            "Ingested document {} into domain '{}': {} passages",
            document.id,
            document.domain,
            ids.len()
        );
        Ok(ids)
    }

    /// Ingest many documents, collecting per-document failures
    pub async fn ingest_batch(&self, documents: Vec<Document>) -> BatchReport {
        let total = documents.len();
        let mut report = BatchReport::default();

        for document in documents {
            let id = document.id.clone();
            match self.ingest(document).await {
                Ok(ids) => report.ingested.push((id, ids)),
                Err(e) => {
                    warn!("Failed to ingest document {}: {}", id, e);
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            "Batch ingest: {}/{} documents, {} passages, {} failed",
            report.ingested.len(),
            total,
            report.passage_count(),
            report.failed.len()
        );
        report
    }

    /// Remove a document from both sub-indexes; returns the passages removed
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let index = Arc::clone(&self.index);
        let id = document_id.to_string();
        let removed = tokio::task::spawn_blocking(move || index.remove_document(&id)).await?;
        if removed > 0 {
            info!("Deleted document {} ({} passages)", document_id, removed);
        } else {
            debug!("Delete of unknown document {} ignored", document_id);
        }
        Ok(removed)
    }
}

/// Query path: embed, look up both sub-indexes concurrently, fuse, dedup
pub struct HybridRetriever {
    index: Arc<HybridIndex>,
    embedder: Arc<dyn Embedder>,
    router: DomainRouter,
    fusion: Box<dyn FusionStrategy>,
    retry: RetryPolicy,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// Create a new hybrid retriever
    pub fn new(index: Arc<HybridIndex>, embedder: Arc<dyn Embedder>, config: &Config) -> Result<Self> {
        check_dimensions(&index, embedder.as_ref())?;
        Ok(Self {
            index,
            embedder,
            router: DomainRouter::new(&config.routing),
            fusion: create_fusion(&config.retrieval),
            retry: RetryPolicy::from(&config.embedding),
            config: config.retrieval.clone(),
        })
    }

    /// Replace the fusion policy
    pub fn with_fusion(mut self, fusion: Box<dyn FusionStrategy>) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `k` passages for `query`, optionally restricted to one domain.
    ///
    /// `timeout` bounds the whole call, embedding included; `None` uses the
    /// configured `query_timeout_ms`. On expiry the embedding request is dropped,
    /// in-flight index scans are cancelled and `RetrievalTimeout` is returned.
    pub async fn retrieve(
        &self,
        query: &str,
        domain: Option<&str>,
        k: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<ScoredPassage>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let deadline = timeout.unwrap_or(Duration::from_millis(self.config.query_timeout_ms));
        let started = Instant::now();
        let cancel = Cancellation::new();
        let guard = cancel.drop_guard();

        match tokio::time::timeout(deadline, self.retrieve_inner(query, domain, k, &cancel)).await {
            Ok(result) => {
                guard.disarm();
                result
            }
            Err(_) => {
                drop(guard);
                let elapsed = started.elapsed();
                warn!(
                    "Retrieval for '{}' exceeded its {:?} deadline",
                    truncate_str(query, 50),
                    deadline
                );
                Err(Error::RetrievalTimeout { elapsed })
            }
        }
    }

    async fn retrieve_inner(
        &self,
        query: &str,
        domain: Option<&str>,
        k: usize,
        cancel: &Cancellation,
    ) -> Result<Vec<ScoredPassage>> {
        let filter = self.router.restrict(domain);
        if let DomainFilter::Only(d) = &filter {
            if !self.index.has_domain(d) {
                debug!("No passages tagged '{}', returning no results", d);
                return Ok(Vec::new());
            }
        }

        let mut embedding_failure = None;
        let query_vector = match embed_with_retry(self.embedder.as_ref(), &self.retry, query).await {
            Ok(vector) => {
                if vector.len() != self.index.dimensions() {
                    return Err(Error::DimensionMismatch {
                        expected: self.index.dimensions(),
                        actual: vector.len(),
                    });
                }
                Some(vector)
            }
            Err(e) => {
                warn!(
                    "Query embedding failed ({}), continuing with lexical retrieval only",
                    e
                );
                embedding_failure = Some(e);
                None
            }
        };

        let m = self.config.candidate_count(k);
        let (dense, lexical) = self.lookup(query, query_vector, &filter, m, cancel).await;
        let results = self.settle(dense, lexical, embedding_failure, k)?;

        info!(
            "Hybrid retrieval for '{}' in domain {}: {} results",
            truncate_str(query, 50),
            filter,
            results.len()
        );
        Ok(results)
    }

    /// Fuse whichever sub-results arrived, or fail when none can answer the query
    fn settle(
        &self,
        dense: Option<Hits>,
        lexical: Option<Hits>,
        embedding_failure: Option<EmbeddingError>,
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        if let Some(err) = embedding_failure {
            if lexical.as_ref().map_or(true, |hits| hits.is_empty()) {
                return Err(match err {
                    e if e.is_transient() => Error::RetrievalUnavailable(format!(
                        "query embedding failed ({}) and lexical retrieval found nothing",
                        e
                    )),
                    e => Error::EmbeddingProvider(e),
                });
            }
        } else if dense.is_none() && lexical.is_none() {
            return Err(Error::RetrievalUnavailable(
                "both index lookups missed their deadline".to_string(),
            ));
        }

        let mut results = self.fuse(dense.unwrap_or_default(), lexical.unwrap_or_default());
        results.sort_by(rank_order);
        let mut results = deduplicate(results, self.config.dedup_overlap_threshold);
        results.truncate(k);
        Ok(results)
    }

    /// Run the dense and lexical lookups concurrently against one index generation.
    ///
    /// Returns `None` for a modality that was skipped, failed, or missed
    /// `subquery_timeout_ms`.
    async fn lookup(
        &self,
        query: &str,
        query_vector: Option<Vec<f32>>,
        filter: &DomainFilter,
        m: usize,
        cancel: &Cancellation,
    ) -> (Option<Hits>, Option<Hits>) {
        let dense_enabled = query_vector.is_some();
        let (dense_tx, dense_rx) = oneshot::channel::<Result<Hits>>();
        let (lexical_tx, lexical_rx) = oneshot::channel::<Hits>();

        let index = Arc::clone(&self.index);
        let text = query.to_string();
        let filter = filter.clone();
        let scan_cancel = cancel.clone();
        let min_similarity = self.config.min_dense_similarity;

        tokio::task::spawn_blocking(move || {
            let guard = index.read();
            let state: &IndexState = &guard;
            let (filter, cancel) = (&filter, &scan_cancel);

            std::thread::scope(|s| {
                if let Some(vector) = query_vector.as_deref() {
                    s.spawn(move || {
                        let hits = state.dense_candidates(vector, filter, m, cancel).map(|hits| {
                            resolve_hits(
                                state,
                                hits.into_iter()
                                    .filter(|h| h.similarity > min_similarity)
                                    .map(|h| (h.passage_id, h.similarity)),
                                RetrievalMethod::Dense,
                            )
                        });
                        let _ = dense_tx.send(hits);
                    });
                }
                s.spawn(move || {
                    let hits = state.lexical_candidates(&text, filter, m, cancel);
                    let hits = resolve_hits(
                        state,
                        hits.into_iter().map(|h| (h.passage_id, h.score)),
                        RetrievalMethod::Lexical,
                    );
                    let _ = lexical_tx.send(hits);
                });
            });
        });

        let subquery_deadline =
            Instant::now() + Duration::from_millis(self.config.subquery_timeout_ms);

        let dense = if dense_enabled {
            match await_subquery(RetrievalMethod::Dense, dense_rx, subquery_deadline).await {
                Some(Ok(hits)) => Some(hits),
                Some(Err(e)) => {
                    warn!("Dense lookup failed, continuing without it: {}", e);
                    None
                }
                None => None,
            }
        } else {
            None
        };
        let lexical = await_subquery(RetrievalMethod::Lexical, lexical_rx, subquery_deadline).await;

        if (dense_enabled && dense.is_none()) || lexical.is_none() {
            cancel.cancel();
        }

        debug!(
            "Lookup: dense={:?} lexical={:?}",
            dense.as_ref().map(Vec::len),
            lexical.as_ref().map(Vec::len)
        );
        (dense, lexical)
    }

    fn fuse(&self, dense: Hits, lexical: Hits) -> Vec<ScoredPassage> {
        let dense_ranked: Vec<(PassageId, f32)> =
            dense.iter().map(|(p, s)| (p.id.clone(), *s)).collect();
        let lexical_ranked: Vec<(PassageId, f32)> =
            lexical.iter().map(|(p, s)| (p.id.clone(), *s)).collect();

        let mut passages: HashMap<PassageId, Passage> = HashMap::new();
        for (passage, _) in dense.into_iter().chain(lexical) {
            passages.entry(passage.id.clone()).or_insert(passage);
        }

        self.fusion
            .fuse(&dense_ranked, &lexical_ranked)
            .into_iter()
            .filter_map(|candidate| {
                let passage = passages.remove(&candidate.passage_id)?;
                let mut matched_by = Vec::with_capacity(2);
                if candidate.dense_rank.is_some() {
                    matched_by.push(RetrievalMethod::Dense);
                }
                if candidate.lexical_rank.is_some() {
                    matched_by.push(RetrievalMethod::Lexical);
                }
                Some(ScoredPassage {
                    passage,
                    dense_score: candidate.dense_score,
                    lexical_score: candidate.lexical_score,
                    fused_score: candidate.fused_score,
                    raw_dense: candidate.raw_dense,
                    raw_lexical: candidate.raw_lexical,
                    matched_by,
                })
            })
            .collect()
    }
}

/// Wait for one sub-index result until `deadline`; `None` when it never arrives
async fn await_subquery<T>(
    method: RetrievalMethod,
    rx: oneshot::Receiver<T>,
    deadline: Instant,
) -> Option<T> {
    match tokio::time::timeout_at(deadline, rx).await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(_)) => {
            warn!("Sub-index lookup ({}) ended without a result", method);
            None
        }
        Err(_) => {
            warn!("Sub-index lookup ({}) missed its deadline, continuing without it", method);
            None
        }
    }
}

/// Attach passages to hits, excluding any hit whose passage is not fully indexed
fn resolve_hits(
    state: &IndexState,
    hits: impl Iterator<Item = (PassageId, f32)>,
    method: RetrievalMethod,
) -> Hits {
    hits.filter_map(|(id, score)| match state.resolve(&id) {
        Ok(passage) => Some((passage.clone(), score)),
        Err(e) => {
            error!("Excluding {} hit: {}", method, e);
            None
        }
    })
    .collect()
}
