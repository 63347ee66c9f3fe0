//! Document splitting into overlapping passages

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{passage_id, CharSpan, Document, Passage};
use chrono::{DateTime, Utc};
use std::iter::FusedIterator;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Splits documents into passages of `[min_chunk_size, chunk_size]` words
/// that overlap by `overlap_fraction` and together cover every character.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

/// Location of one word token in the source text
#[derive(Debug, Clone, Copy)]
struct WordBound {
    byte_start: usize,
    byte_end: usize,
    char_start: usize,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split a document into passages.
    ///
    /// Window boundaries are planned up front; passages are materialized lazily
    /// as the returned iterator is consumed. Cloning the iterator restarts it.
    pub fn chunk<'a>(&self, document: &'a Document) -> Result<Passages<'a>> {
        if document.id.trim().is_empty() {
            return Err(Error::invalid_document("", "document id is empty"));
        }
        if document.text.trim().is_empty() {
            return Err(Error::invalid_document(&document.id, "document text is empty"));
        }

        let words = word_bounds(&document.text);
        if words.is_empty() {
            return Err(Error::invalid_document(
                &document.id,
                "document contains no word tokens",
            ));
        }

        let windows = self.plan_windows(&document.text, &words);
        debug!(
            "Planned {} passages for document {} ({} words)",
            windows.len(),
            document.id,
            words.len()
        );

        Ok(Passages {
            document,
            total_chars: document.text.chars().count(),
            words,
            windows,
            next: 0,
            ingested_at: Utc::now(),
        })
    }

    /// Compute `[start, end)` word ranges for every passage
    fn plan_windows(&self, text: &str, words: &[WordBound]) -> Vec<(usize, usize)> {
        let n = words.len();
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.overlap_tokens();
        let min = self.config.min_chunk_size.clamp(1, size);

        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            if n - start <= size {
                // Final window: pull it back so it keeps at least `min` words
                let final_start = if n - start < min {
                    n.saturating_sub(min).min(start)
                } else {
                    start
                };
                windows.push((final_start, n));
                break;
            }

            let mut end = start + size;
            if self.config.sentence_aware {
                end = self.sentence_end(text, words, start, end, min, overlap);
            }
            windows.push((start, end));

            start = end.saturating_sub(overlap).max(start + 1);
        }

        windows
    }

    /// Pull `end` back to the latest sentence start within the overlap region,
    /// as long as the passage keeps at least `min` words.
    fn sentence_end(
        &self,
        text: &str,
        words: &[WordBound],
        start: usize,
        end: usize,
        min: usize,
        overlap: usize,
    ) -> usize {
        let lookback = overlap.max(1);
        let floor = (start + min).max(end.saturating_sub(lookback));

        (floor..=end)
            .rev()
            .find(|&i| i > start && starts_sentence(text, words, i))
            .unwrap_or(end)
    }
}

/// Whether word `i` begins a new sentence or paragraph
fn starts_sentence(text: &str, words: &[WordBound], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    let Some(word) = words.get(i) else {
        return false;
    };
    let gap = &text[words[i - 1].byte_end..word.byte_start];
    gap.contains(['.', '!', '?']) || gap.contains("\n\n")
}

fn word_bounds(text: &str) -> Vec<WordBound> {
    let mut bounds = Vec::new();
    let mut chars_seen = 0;
    let mut last_byte = 0;

    for (byte_start, word) in text.unicode_word_indices() {
        chars_seen += text[last_byte..byte_start].chars().count();
        last_byte = byte_start;
        bounds.push(WordBound {
            byte_start,
            byte_end: byte_start + word.len(),
            char_start: chars_seen,
        });
    }

    bounds
}

/// Lazy, finite sequence of passages for one document
#[derive(Debug, Clone)]
pub struct Passages<'a> {
    document: &'a Document,
    words: Vec<WordBound>,
    windows: Vec<(usize, usize)>,
    total_chars: usize,
    next: usize,
    ingested_at: DateTime<Utc>,
}

impl Passages<'_> {
    /// Restart the sequence from the first passage
    pub fn rewind(&mut self) {
        self.next = 0;
    }

    fn materialize(&self, ordinal: usize) -> Passage {
        let (first, last) = self.windows[ordinal];
        let n = self.words.len();
        let text = &self.document.text;

        // First passage starts at the beginning of the text; every passage runs up
        // to the next uncovered word so separators belong to the preceding passage.
        let (byte_start, char_start) = if first == 0 {
            (0, 0)
        } else {
            (self.words[first].byte_start, self.words[first].char_start)
        };
        let (byte_end, char_end) = if last == n {
            (text.len(), self.total_chars)
        } else {
            (self.words[last].byte_start, self.words[last].char_start)
        };

        Passage {
            id: passage_id(&self.document.id, char_start),
            document_id: self.document.id.clone(),
            domain: self.document.domain.clone(),
            span: CharSpan::new(char_start, char_end),
            ordinal,
            token_count: last - first,
            text: text[byte_start..byte_end].to_string(),
            embedding: None,
            ingested_at: self.ingested_at,
        }
    }
}

impl Iterator for Passages<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        if self.next >= self.windows.len() {
            return None;
        }
        let passage = self.materialize(self.next);
        self.next += 1;
        Some(passage)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.windows.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Passages<'_> {}

impl FusedIterator for Passages<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config(chunk_size: usize, overlap_fraction: f32, min_chunk_size: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap_fraction,
            min_chunk_size,
            sentence_aware: true,
            clean_text: false,
            domains: Default::default(),
        }
    }

    fn assert_full_coverage(doc: &Document, passages: &[Passage]) {
        let total = doc.text.chars().count();
        let mut covered = vec![false; total];
        for p in passages {
            for c in covered.iter_mut().take(p.span.end).skip(p.span.start) {
                *c = true;
            }
        }
        assert!(
            covered.iter().all(|c| *c),
            "document '{}' not fully covered",
            doc.id
        );
    }

    #[test]
    fn test_basic_splitting() {
        let chunker = Chunker::new(config(20, 0.2, 5));
        let doc = Document::new(
            "d1",
            "This is a test document. It has multiple sentences. \
             We want to test the chunking functionality. \
             This should create multiple chunks when the content is long enough. \
             Here is some more content to ensure we have enough text for testing. \
             And even more content here to really make sure we test the overlap behavior.",
            "general",
        );

        let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();

        assert!(passages.len() > 1);
        for p in &passages {
            assert!(!p.text.trim().is_empty());
            assert!(p.token_count <= 20);
            assert!(p.token_count >= 5);
            assert_eq!(p.document_id, "d1");
            assert_eq!(p.domain, "general");
            assert_eq!(p.id, format!("d1#{}", p.span.start));
        }
        assert_full_coverage(&doc, &passages);
    }

    #[test]
    fn test_adjacent_passages_overlap() {
        let chunker = Chunker::new(ChunkingConfig {
            sentence_aware: false,
            ..config(10, 0.2, 2)
        });
        let text: Vec<String> = (0..50).map(|i| format!("w{}", i)).collect();
        let doc = Document::new("d", text.join(" "), "x");

        let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();
        for pair in passages.windows(2) {
            assert!(
                pair[0].span.intersection(&pair[1].span) > 0,
                "passages {} and {} do not overlap",
                pair[0].id,
                pair[1].id
            );
        }
        // Two words of overlap between full windows
        assert!(passages[1].text.starts_with("w8 "));
    }

    #[test]
    fn test_empty_document_is_invalid() {
        let chunker = Chunker::new(ChunkingConfig::default());
        let err = chunker.chunk(&Document::new("d", "", "x")).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));

        let err = chunker.chunk(&Document::new("d", "   \n\t ", "x")).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
    }

    #[test]
    fn test_punctuation_only_document_is_invalid() {
        let chunker = Chunker::new(ChunkingConfig::default());
        let err = chunker.chunk(&Document::new("d", "... --- !!!", "x")).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
    }

    #[test]
    fn test_missing_id_is_invalid() {
        let chunker = Chunker::new(ChunkingConfig::default());
        assert!(chunker.chunk(&Document::new("", "some text", "x")).is_err());
    }

    #[test]
    fn test_very_short_document_single_passage() {
        let chunker = Chunker::new(config(100, 0.15, 20));
        let doc = Document::new("d", "A short document.", "x");
        let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();

        assert_eq!(passages.len(), 1, "Very short document should produce exactly one passage");
        assert_eq!(passages[0].text, "A short document.");
        assert_eq!(passages[0].span, CharSpan::new(0, 17));
        assert_eq!(passages[0].token_count, 3);
    }

    #[test]
    fn test_final_passage_keeps_minimum_size() {
        let chunker = Chunker::new(ChunkingConfig {
            sentence_aware: false,
            ..config(10, 0.0, 5)
        });
        let text: Vec<String> = (0..21).map(|i| format!("t{}", i)).collect();
        let doc = Document::new("d", text.join(" "), "x");
        let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();

        let last = passages.last().unwrap();
        assert!(last.token_count >= 5, "tail passage has {} tokens", last.token_count);
        assert_full_coverage(&doc, &passages);
    }

    #[test]
    fn test_sentence_aware_boundary() {
        let chunker = Chunker::new(config(12, 0.25, 3));
        let doc = Document::new(
            "d",
            "one two three four five six seven eight nine ten. \
             Eleven twelve thirteen fourteen fifteen sixteen seventeen.",
            "x",
        );
        let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();
        assert!(passages[0].text.trim_end().ends_with("ten."));
        assert_full_coverage(&doc, &passages);
    }

    #[test]
    fn test_sequence_is_restartable() {
        let chunker = Chunker::new(config(8, 0.25, 2));
        let doc = Document::new("d", "alpha beta gamma delta ".repeat(10), "x");

        let mut passages = chunker.chunk(&doc).unwrap();
        let restart = passages.clone();
        let first_pass: Vec<String> = passages.by_ref().map(|p| p.id).collect();
        assert_eq!(passages.len(), 0);

        let second_pass: Vec<String> = restart.map(|p| p.id).collect();
        assert_eq!(first_pass, second_pass);

        passages.rewind();
        assert_eq!(passages.count(), first_pass.len());
    }

    #[test]
    fn test_ids_stable_across_calls() {
        let chunker = Chunker::new(config(8, 0.25, 2));
        let doc = Document::new("d", "alpha beta gamma delta ".repeat(10), "x");
        let a: Vec<String> = chunker.chunk(&doc).unwrap().map(|p| p.id).collect();
        let b: Vec<String> = chunker.chunk(&doc).unwrap().map(|p| p.id).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multibyte_text_spans_use_char_offsets() {
        let chunker = Chunker::new(config(3, 0.0, 1));
        let doc = Document::new("d", "héllo wörld ça va très bien", "x");
        let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();
        let chars: Vec<char> = doc.text.chars().collect();
        for p in &passages {
            let expected: String = chars[p.span.start..p.span.end].iter().collect();
            assert_eq!(p.text, expected);
        }
        assert_full_coverage(&doc, &passages);
    }

    #[test]
    fn test_coverage_over_random_texts() {
        let mut rng = StdRng::seed_from_u64(7);
        let vocabulary = [
            "cell", "water", "boiling", "point.", "gpio", "api,", "tree", "graph!", "llm", "\n\n",
            "  ", "naïve", "data", "(json)", "x",
        ];

        for round in 0..200 {
            let words = rng.gen_range(1..400);
            let mut text = String::new();
            for _ in 0..words {
                text.push_str(vocabulary[rng.gen_range(0..vocabulary.len())]);
                text.push(if rng.gen_bool(0.1) { '\n' } else { ' ' });
            }
            if text.trim().is_empty() {
                continue;
            }
            let doc = Document::new(format!("doc{}", round), text, "x");
            let chunker = Chunker::new(ChunkingConfig {
                chunk_size: rng.gen_range(4..64),
                overlap_fraction: rng.gen_range(0.0..0.5),
                min_chunk_size: rng.gen_range(1..4),
                sentence_aware: rng.gen_bool(0.5),
                clean_text: false,
                domains: Default::default(),
            });

            let passages: Vec<Passage> = chunker.chunk(&doc).unwrap().collect();
            assert!(!passages.is_empty());
            assert_full_coverage(&doc, &passages);
            for p in &passages {
                assert!(p.token_count <= chunker.config().chunk_size);
            }
        }
    }
}
