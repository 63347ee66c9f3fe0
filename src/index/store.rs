//! Passage storage with a document -> passages secondary index

use crate::types::{DocumentId, Domain, Passage, PassageId};
use std::collections::{BTreeMap, HashMap};

/// Passage metadata and text, keyed by passage id
#[derive(Debug, Default)]
pub struct PassageStore {
    passages: HashMap<PassageId, Passage>,
    /// Secondary index: document_id -> passage ids in ordinal order
    documents: HashMap<DocumentId, Vec<PassageId>>,
    /// Passage count per domain
    domains: BTreeMap<Domain, usize>,
}

impl PassageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the passages of a document; the caller removes any previous version first
    pub fn insert_document(&mut self, document_id: &str, passages: Vec<Passage>) {
        let ids: Vec<PassageId> = passages.iter().map(|p| p.id.clone()).collect();
        for passage in passages {
            *self.domains.entry(passage.domain.clone()).or_insert(0) += 1;
            self.passages.insert(passage.id.clone(), passage);
        }
        self.documents.insert(document_id.to_string(), ids);
    }

    /// Remove a document and return its passages
    pub fn remove_document(&mut self, document_id: &str) -> Vec<Passage> {
        let Some(ids) = self.documents.remove(document_id) else {
            return Vec::new();
        };

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(passage) = self.passages.remove(&id) {
                if let Some(count) = self.domains.get_mut(&passage.domain) {
                    *count -= 1;
                    if *count == 0 {
                        self.domains.remove(&passage.domain);
                    }
                }
                removed.push(passage);
            }
        }
        removed
    }

    pub fn get(&self, passage_id: &str) -> Option<&Passage> {
        self.passages.get(passage_id)
    }

    pub fn contains(&self, passage_id: &str) -> bool {
        self.passages.contains_key(passage_id)
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    /// Passage ids of a document in ordinal order
    pub fn document_passages(&self, document_id: &str) -> Option<&[PassageId]> {
        self.documents.get(document_id).map(|ids| ids.as_slice())
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Passage counts per domain, sorted by domain
    pub fn domains(&self) -> impl Iterator<Item = (&Domain, usize)> {
        self.domains.iter().map(|(d, c)| (d, *c))
    }

    /// All passages, ordered by document id then ordinal
    pub fn passages_sorted(&self) -> Vec<&Passage> {
        let mut passages: Vec<&Passage> = self.passages.values().collect();
        passages.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        passages
    }

    pub fn passage_ids(&self) -> impl Iterator<Item = &PassageId> {
        self.passages.keys()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }
}
