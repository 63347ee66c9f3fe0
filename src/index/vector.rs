//! Vector index: exact linear scan with an optional USearch HNSW graph
//!
//! Every vector is kept in an exact store. Once the corpus reaches
//! `brute_force_threshold` vectors an HNSW graph is built alongside and used
//! for queries, as long as its measured recall stays above `recall_floor`.

use crate::config::{IndexConfig, SimilarityMetric};
use crate::error::{Error, Result};
use crate::routing::DomainFilter;
use crate::types::{Domain, Embedding, PassageId};
use crate::util::{cosine_similarity, l2_distance, Cancellation};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// How often exact scans check for cancellation
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Neighbors compared per sample during the recall check
const RECALL_CHECK_K: usize = 10;

/// A stored vector and the domain of its passage
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub vector: Embedding,
    pub domain: Domain,
}

/// Search result from the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub passage_id: PassageId,
    pub similarity: f32,
}

/// Which path answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnState {
    /// Corpus below the brute-force threshold
    Exact,
    /// HNSW graph built and trusted
    Hnsw,
    /// HNSW graph built but below the recall floor; exact scan in use
    ExactFallback,
}

/// HNSW graph kept in sync with the exact store
struct AnnGraph {
    index: Index,
    key_to_passage: HashMap<u64, PassageId>,
    passage_to_key: HashMap<PassageId, u64>,
    next_key: u64,
    recall: f32,
    trusted: bool,
}

/// Vector index for storing and querying embeddings
pub struct VectorIndex {
    records: HashMap<PassageId, VectorRecord>,
    ann: Option<AnnGraph>,
    config: IndexConfig,
    dimensions: usize,
}

impl VectorIndex {
    pub fn new(dimensions: usize, config: &IndexConfig) -> Self {
        Self {
            records: HashMap::new(),
            ann: None,
            config: config.clone(),
            dimensions,
        }
    }

    pub fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace the vector for `passage_id`
    pub fn upsert(&mut self, passage_id: &str, vector: Embedding, domain: &str) -> Result<()> {
        self.check_dimensions(&vector)?;

        if let Some(ann) = self.ann.as_mut() {
            if let Err(e) = ann.upsert(passage_id, &vector) {
                warn!("Dropping HNSW graph after insert failure: {}", e);
                self.ann = None;
            }
        }

        self.records.insert(
            passage_id.to_string(),
            VectorRecord {
                vector,
                domain: domain.to_string(),
            },
        );

        if self.ann.is_none() && self.records.len() >= self.config.brute_force_threshold {
            self.build_ann();
        }
        Ok(())
    }

    /// Remove the vector for `passage_id`; no-op if absent
    pub fn delete(&mut self, passage_id: &str) -> bool {
        if self.records.remove(passage_id).is_none() {
            return false;
        }

        if let Some(ann) = self.ann.as_mut() {
            if let Err(e) = ann.remove(passage_id) {
                warn!("Dropping HNSW graph after remove failure: {}", e);
                self.ann = None;
            }
        }

        if self.ann.is_some() && self.records.len() < self.config.brute_force_threshold {
            debug!("Vector count below brute-force threshold, dropping HNSW graph");
            self.ann = None;
        }
        true
    }

    /// Top-k passages by similarity, restricted to `filter`
    pub fn query(
        &self,
        vector: &[f32],
        filter: &DomainFilter,
        k: usize,
        cancel: &Cancellation,
    ) -> Result<Vec<VectorHit>> {
        self.check_dimensions(vector)?;
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(ann) = self.ann.as_ref().filter(|a| a.trusted) {
            match self.ann_query(ann, vector, filter, k) {
                Ok(Some(hits)) => return Ok(hits),
                Ok(None) => debug!("HNSW returned too few matches for {}, using exact scan", filter),
                Err(e) => warn!("HNSW search failed, using exact scan: {}", e),
            }
        }

        Ok(self.exact_query(vector, filter, k, cancel))
    }

    /// Linear scan over every stored vector
    pub fn exact_query(
        &self,
        vector: &[f32],
        filter: &DomainFilter,
        k: usize,
        cancel: &Cancellation,
    ) -> Vec<VectorHit> {
        let mut hits = Vec::new();

        for (i, (passage_id, record)) in self.records.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!("Exact vector scan cancelled after {} records", i);
                return Vec::new();
            }
            if !filter.matches(&record.domain) {
                continue;
            }
            hits.push(VectorHit {
                passage_id: passage_id.clone(),
                similarity: self.similarity(vector, &record.vector),
            });
        }

        top_k(hits, k)
    }

    /// Returns `None` when fewer than `k` matches survive the domain filter
    fn ann_query(
        &self,
        ann: &AnnGraph,
        vector: &[f32],
        filter: &DomainFilter,
        k: usize,
    ) -> Result<Option<Vec<VectorHit>>> {
        let fetch = if filter.is_restricted() {
            k.saturating_mul(4).max(k + 32)
        } else {
            k
        }
        .min(self.records.len());

        let matches = ann
            .index
            .search(vector, fetch)
            .map_err(|e| Error::Ann(e.to_string()))?;

        let hits: Vec<VectorHit> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, &distance)| {
                let passage_id = ann.key_to_passage.get(key)?;
                let record = self.records.get(passage_id)?;
                filter.matches(&record.domain).then(|| VectorHit {
                    passage_id: passage_id.clone(),
                    similarity: self.distance_to_similarity(distance),
                })
            })
            .collect();

        let wanted = k.min(self.records.len());
        if hits.len() < wanted {
            return Ok(None);
        }
        Ok(Some(top_k(hits, k)))
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.config.metric {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::L2 => 1.0 / (1.0 + l2_distance(a, b)),
        }
    }

    /// Convert a USearch distance to the same similarity the exact path reports
    fn distance_to_similarity(&self, distance: f32) -> f32 {
        match self.config.metric {
            SimilarityMetric::Cosine => 1.0 - distance,
            SimilarityMetric::L2 => 1.0 / (1.0 + distance.max(0.0).sqrt()),
        }
    }

    /// Build the HNSW graph from the exact store and measure its recall
    fn build_ann(&mut self) {
        info!(
            "Building HNSW graph: {} vectors, M={}, ef_construction={}",
            self.records.len(),
            self.config.hnsw_m,
            self.config.hnsw_ef_construction
        );

        let mut graph = match AnnGraph::new(self.dimensions, &self.config, self.records.len()) {
            Ok(graph) => graph,
            Err(e) => {
                warn!("Failed to create HNSW graph, staying on exact scan: {}", e);
                return;
            }
        };

        let mut ids: Vec<&PassageId> = self.records.keys().collect();
        ids.sort();
        for id in ids {
            if let Err(e) = graph.upsert(id, &self.records[id].vector) {
                warn!("Failed to build HNSW graph, staying on exact scan: {}", e);
                return;
            }
        }

        graph.recall = self.measure_recall(&graph);
        graph.trusted = graph.recall >= self.config.recall_floor;
        if graph.trusted {
            info!("HNSW graph ready, recall@{} = {:.3}", RECALL_CHECK_K, graph.recall);
        } else {
            warn!(
                "HNSW recall@{} = {:.3} is below floor {:.3}, serving from exact scan",
                RECALL_CHECK_K, graph.recall, self.config.recall_floor
            );
        }
        self.ann = Some(graph);
    }

    /// Average recall@k of the graph against the exact scan over sampled stored vectors
    fn measure_recall(&self, graph: &AnnGraph) -> f32 {
        let mut ids: Vec<&PassageId> = self.records.keys().collect();
        ids.sort();
        let samples = self.config.recall_sample_size.clamp(1, ids.len().max(1));
        let step = (ids.len() / samples).max(1);
        let k = RECALL_CHECK_K.min(self.records.len());
        let never = Cancellation::new();

        let mut total = 0.0;
        let mut measured = 0;
        for id in ids.iter().step_by(step).take(samples) {
            let query = &self.records[*id].vector;
            let exact: HashSet<PassageId> = self
                .exact_query(query, &DomainFilter::All, k, &never)
                .into_iter()
                .map(|h| h.passage_id)
                .collect();

            let Ok(matches) = graph.index.search(query, k) else {
                return 0.0;
            };
            let found = matches
                .keys
                .iter()
                .filter_map(|key| graph.key_to_passage.get(key))
                .filter(|p| exact.contains(*p))
                .count();

            total += found as f32 / k.max(1) as f32;
            measured += 1;
        }

        if measured == 0 {
            return 1.0;
        }
        total / measured as f32
    }

    /// Re-measure the graph's recall and update whether it is trusted
    pub fn recheck_recall(&mut self) -> Option<f32> {
        let mut ann = self.ann.take()?;
        ann.recall = self.measure_recall(&ann);
        ann.trusted = ann.recall >= self.config.recall_floor;
        let recall = ann.recall;
        self.ann = Some(ann);
        Some(recall)
    }

    pub fn ann_state(&self) -> AnnState {
        match &self.ann {
            None => AnnState::Exact,
            Some(ann) if ann.trusted => AnnState::Hnsw,
            Some(_) => AnnState::ExactFallback,
        }
    }

    pub fn get(&self, passage_id: &str) -> Option<&VectorRecord> {
        self.records.get(passage_id)
    }

    pub fn contains(&self, passage_id: &str) -> bool {
        self.records.contains_key(passage_id)
    }

    pub fn passage_ids(&self) -> impl Iterator<Item = &PassageId> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl AnnGraph {
    fn new(dimensions: usize, config: &IndexConfig, capacity: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions,
            metric: match config.metric {
                SimilarityMetric::Cosine => MetricKind::Cos,
                SimilarityMetric::L2 => MetricKind::L2sq,
            },
            quantization: ScalarKind::F32,
            connectivity: config.hnsw_m,
            expansion_add: config.hnsw_ef_construction,
            expansion_search: config.hnsw_ef_search,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| Error::Ann(e.to_string()))?;
        index
            .reserve(capacity.max(64) * 2)
            .map_err(|e| Error::Ann(format!("Failed to reserve index capacity: {}", e)))?;

        Ok(Self {
            index,
            key_to_passage: HashMap::new(),
            passage_to_key: HashMap::new(),
            next_key: 0,
            recall: 1.0,
            trusted: true,
        })
    }

    fn upsert(&mut self, passage_id: &str, vector: &[f32]) -> Result<()> {
        self.remove(passage_id)?;

        if self.index.size() + 1 > self.index.capacity() {
            let grown = (self.index.capacity() * 2).max(64);
            self.index
                .reserve(grown)
                .map_err(|e| Error::Ann(format!("Failed to grow index capacity: {}", e)))?;
        }

        let key = self.next_key;
        self.next_key += 1;
        self.index
            .add(key, vector)
            .map_err(|e| Error::Ann(format!("Failed to add to index: {}", e)))?;

        self.key_to_passage.insert(key, passage_id.to_string());
        self.passage_to_key.insert(passage_id.to_string(), key);
        Ok(())
    }

    fn remove(&mut self, passage_id: &str) -> Result<()> {
        let Some(key) = self.passage_to_key.remove(passage_id) else {
            return Ok(());
        };
        self.key_to_passage.remove(&key);
        self.index
            .remove(key)
            .map_err(|e| Error::Ann(format!("Failed to remove from index: {}", e)))?;
        Ok(())
    }
}

/// Keep the `k` best hits: similarity descending, then passage id ascending
fn top_k(mut hits: Vec<VectorHit>, k: usize) -> Vec<VectorHit> {
    let order = |a: &VectorHit, b: &VectorHit| -> Ordering {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.passage_id.cmp(&b.passage_id))
    };

    if hits.len() > k {
        hits.select_nth_unstable_by(k, order);
        hits.truncate(k);
    }
    hits.sort_by(order);
    hits
}
