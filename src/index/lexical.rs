//! BM25 lexical index
//!
//! In-memory inverted index with exact corpus statistics. Deleting a passage
//! removes its postings and keeps N, document frequencies and the average
//! passage length exact for the passages that remain.

use crate::chunking::Analyzer;
use crate::config::LexicalConfig;
use crate::routing::DomainFilter;
use crate::types::{Domain, PassageId};
use crate::util::Cancellation;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-passage statistics needed for scoring and deletion
#[derive(Debug, Clone)]
struct PassageEntry {
    length: u32,
    domain: Domain,
    terms: Vec<String>,
}

/// BM25 search result
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub passage_id: PassageId,
    pub score: f32,
}

#[derive(Debug)]
pub struct LexicalIndex {
    /// term -> passage -> term frequency
    postings: HashMap<String, HashMap<PassageId, u32>>,
    entries: HashMap<PassageId, PassageEntry>,
    total_length: u64,
    analyzer: Analyzer,
    k1: f32,
    b: f32,
}

impl LexicalIndex {
    pub fn new(config: &LexicalConfig) -> Self {
        Self {
            postings: HashMap::new(),
            entries: HashMap::new(),
            total_length: 0,
            analyzer: Analyzer::new(config.stemming),
            k1: config.k1,
            b: config.b,
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Index a passage, replacing any previous entry with the same id
    pub fn index(&mut self, passage_id: &str, text: &str, domain: &str) {
        self.delete(passage_id);

        let tokens = self.analyzer.analyze(text);
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for token in tokens.iter() {
            *frequencies.entry(token.clone()).or_insert(0) += 1;
        }

        let terms: Vec<String> = frequencies.keys().cloned().collect();
        for (term, tf) in frequencies {
            self.postings
                .entry(term)
                .or_default()
                .insert(passage_id.to_string(), tf);
        }

        self.total_length += tokens.len() as u64;
        self.entries.insert(
            passage_id.to_string(),
            PassageEntry {
                length: tokens.len() as u32,
                domain: domain.to_string(),
                terms,
            },
        );
    }

    /// Remove a passage; no-op if absent
    pub fn delete(&mut self, passage_id: &str) -> bool {
        let Some(entry) = self.entries.remove(passage_id) else {
            return false;
        };

        for term in &entry.terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.remove(passage_id);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_length -= entry.length as u64;
        true
    }

    /// Top-k passages by BM25 score, restricted to `filter`.
    ///
    /// Ordered by score descending, then passage id ascending.
    pub fn query(
        &self,
        text: &str,
        filter: &DomainFilter,
        k: usize,
        cancel: &Cancellation,
    ) -> Vec<LexicalHit> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let terms: Vec<String> = self
            .analyzer
            .analyze(text)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let avgdl = self.average_length().max(1.0);
        let mut scores: HashMap<&PassageId, f32> = HashMap::new();

        for term in &terms {
            if cancel.is_cancelled() {
                debug!("Lexical scan cancelled");
                return Vec::new();
            }
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(list.len());

            for (passage_id, &tf) in list {
                let Some(entry) = self.entries.get(passage_id) else {
                    continue;
                };
                if !filter.matches(&entry.domain) {
                    continue;
                }
                let tf = tf as f32;
                let norm = 1.0 - self.b + self.b * entry.length as f32 / avgdl;
                *scores.entry(passage_id).or_insert(0.0) +=
                    idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm);
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .map(|(passage_id, score)| LexicalHit {
                passage_id: passage_id.clone(),
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.passage_id.cmp(&b.passage_id))
        });
        hits.truncate(k);
        hits
    }

    /// Smoothed IDF, never negative
    fn idf(&self, df: usize) -> f32 {
        let n = self.entries.len() as f32;
        let df = df as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Number of passages containing the analyzed form of `term`
    pub fn document_frequency(&self, term: &str) -> usize {
        self.analyzer
            .analyze(term)
            .first()
            .and_then(|t| self.postings.get(t))
            .map_or(0, |list| list.len())
    }

    pub fn average_length(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.total_length as f32 / self.entries.len() as f32
    }

    pub fn contains(&self, passage_id: &str) -> bool {
        self.entries.contains_key(passage_id)
    }

    pub fn passage_ids(&self) -> impl Iterator<Item = &PassageId> {
        self.entries.keys()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
