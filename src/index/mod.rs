//! Hybrid index: passage store, vector index and BM25 index behind one lock
//!
//! Features:
//! - Exact vector scan below a size threshold, USearch HNSW above it
//! - In-memory BM25 with exact statistics under deletion
//! - Single-writer/multi-reader state: a document is replaced or removed in
//!   all sub-indexes under one write lock, so readers never see it half-indexed
//! - Consistency verification and self-describing snapshots

mod lexical;
mod snapshot;
mod store;
mod vector;

pub use lexical::*;
pub use store::*;
pub use vector::*;

use crate::config::{ChunkingConfig, Config, IndexConfig, LexicalConfig};
use crate::error::{Error, Result};
use crate::routing::DomainFilter;
use crate::types::{Domain, Passage, PassageId};
use crate::util::Cancellation;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// Configuration the index contents were built with (recorded in snapshots)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSettings {
    pub chunking: ChunkingConfig,
    pub lexical: LexicalConfig,
    pub index: IndexConfig,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: config.chunking.clone(),
            lexical: config.lexical.clone(),
            index: config.index.clone(),
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub passages: usize,
    pub vectors: usize,
    pub lexical_passages: usize,
    pub vocabulary: usize,
    pub average_passage_length: f32,
    pub dimensions: usize,
    pub ann: AnnState,
    pub domains: BTreeMap<Domain, usize>,
    pub generation: u64,
}

/// Everything a query reads, guarded together
pub struct IndexState {
    store: PassageStore,
    vectors: VectorIndex,
    lexical: LexicalIndex,
    /// Bumped on every committed write
    generation: u64,
}

impl IndexState {
    fn new(dimensions: usize, settings: &IndexSettings) -> Self {
        Self {
            store: PassageStore::new(),
            vectors: VectorIndex::new(dimensions, &settings.index),
            lexical: LexicalIndex::new(&settings.lexical),
            generation: 0,
        }
    }

    /// Replace every passage of `document_id` with `passages`.
    ///
    /// Passages must carry embeddings. All inputs are validated before any
    /// sub-index is touched.
    fn replace_document(
        &mut self,
        document_id: &str,
        mut passages: Vec<Passage>,
    ) -> Result<Vec<PassageId>> {
        if passages.is_empty() {
            return Err(Error::invalid_document(document_id, "no passages to index"));
        }
        for passage in &passages {
            if passage.document_id != document_id {
                return Err(Error::invalid_document(
                    document_id,
                    format!("passage {} belongs to document {}", passage.id, passage.document_id),
                ));
            }
            match &passage.embedding {
                Some(vector) => self.vectors.check_dimensions(vector)?,
                None => {
                    return Err(Error::invalid_document(
                        document_id,
                        format!("passage {} has no embedding", passage.id),
                    ))
                }
            }
        }

        let replaced = self.remove_passages(document_id);

        let mut ids = Vec::with_capacity(passages.len());
        for passage in passages.iter_mut() {
            if let Some(vector) = passage.embedding.take() {
                self.vectors.upsert(&passage.id, vector, &passage.domain)?;
            }
            self.lexical.index(&passage.id, &passage.text, &passage.domain);
            ids.push(passage.id.clone());
        }
        self.store.insert_document(document_id, passages);
        self.generation += 1;

        debug!(
            "Indexed document {} ({} passages, replaced {})",
            document_id,
            ids.len(),
            replaced
        );
        Ok(ids)
    }

    /// Remove a document from every sub-index; returns the number of passages removed
    fn remove_document(&mut self, document_id: &str) -> usize {
        let removed = self.remove_passages(document_id);
        if removed > 0 {
            self.generation += 1;
        }
        removed
    }

    fn remove_passages(&mut self, document_id: &str) -> usize {
        let removed = self.store.remove_document(document_id);
        for passage in &removed {
            self.vectors.delete(&passage.id);
            self.lexical.delete(&passage.id);
        }
        removed.len()
    }

    /// Dense candidates for a query vector
    pub fn dense_candidates(
        &self,
        vector: &[f32],
        filter: &DomainFilter,
        m: usize,
        cancel: &Cancellation,
    ) -> Result<Vec<VectorHit>> {
        self.vectors.query(vector, filter, m, cancel)
    }

    /// Lexical candidates for a query text
    pub fn lexical_candidates(
        &self,
        text: &str,
        filter: &DomainFilter,
        m: usize,
        cancel: &Cancellation,
    ) -> Vec<LexicalHit> {
        self.lexical.query(text, filter, m, cancel)
    }

    /// Look up a passage, checking that it is present in the store and both sub-indexes
    pub fn resolve(&self, passage_id: &str) -> Result<&Passage> {
        let passage = self
            .store
            .get(passage_id)
            .ok_or_else(|| Error::corruption(passage_id, "missing from passage store"))?;
        if !self.vectors.contains(passage_id) {
            return Err(Error::corruption(passage_id, "missing from vector index"));
        }
        if !self.lexical.contains(passage_id) {
            return Err(Error::corruption(passage_id, "missing from lexical index"));
        }
        Ok(passage)
    }

    /// Maintenance scan: every passage present somewhere but not everywhere
    pub fn verify(&self) -> Vec<Error> {
        let ids: BTreeSet<&PassageId> = self
            .store
            .passage_ids()
            .chain(self.vectors.passage_ids())
            .chain(self.lexical.passage_ids())
            .collect();

        ids.into_iter()
            .filter_map(|id| self.resolve(id).err())
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.store.document_count(),
            passages: self.store.passage_count(),
            vectors: self.vectors.len(),
            lexical_passages: self.lexical.len(),
            vocabulary: self.lexical.vocabulary_size(),
            average_passage_length: self.lexical.average_length(),
            dimensions: self.vectors.dimensions(),
            ann: self.vectors.ann_state(),
            domains: self
                .store
                .domains()
                .map(|(d, c)| (d.clone(), c))
                .collect(),
            generation: self.generation,
        }
    }

    pub fn store(&self) -> &PassageStore {
        &self.store
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Shared hybrid index, injected into both the ingestion and query paths
pub struct HybridIndex {
    state: RwLock<IndexState>,
    settings: IndexSettings,
    dimensions: usize,
}

impl HybridIndex {
    pub fn new(dimensions: usize, settings: IndexSettings) -> Self {
        info!(
            "Creating hybrid index: {} dimensions, metric={:?}, brute_force_threshold={}",
            dimensions, settings.index.metric, settings.index.brute_force_threshold
        );
        Self {
            state: RwLock::new(IndexState::new(dimensions, &settings)),
            settings,
            dimensions,
        }
    }

    /// Read guard over a consistent generation of the index
    pub fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read()
    }

    /// Atomically replace a document's passages in all sub-indexes
    pub fn replace_document(
        &self,
        document_id: &str,
        passages: Vec<Passage>,
    ) -> Result<Vec<PassageId>> {
        self.state.write().replace_document(document_id, passages)
    }

    /// Atomically remove a document from all sub-indexes
    pub fn remove_document(&self, document_id: &str) -> usize {
        self.state.write().remove_document(document_id)
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.state.read().store.contains_document(document_id)
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.state.read().store.has_domain(domain)
    }

    /// Run the consistency scan and log every problem found
    pub fn verify(&self) -> Vec<Error> {
        let problems = self.state.read().verify();
        for problem in &problems {
            error!("{}", problem);
        }
        if problems.is_empty() {
            info!("Index verification passed");
        }
        problems
    }

    /// Re-measure HNSW recall, if a graph is built
    pub fn recheck_recall(&self) -> Option<f32> {
        self.state.write().vectors.recheck_recall()
    }

    pub fn stats(&self) -> IndexStats {
        self.state.read().stats()
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[cfg(test)]
    pub(crate) fn drop_lexical_entry(&self, passage_id: &str) {
        self.state.write().lexical.delete(passage_id);
    }

    /// Hold the writer lock, stalling every lookup until the guard drops
    #[cfg(test)]
    pub(crate) fn write_lock(&self) -> parking_lot::RwLockWriteGuard<'_, IndexState> {
        self.state.write()
    }
}
