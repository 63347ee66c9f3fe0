//! Tokenization and term analysis

use unicode_segmentation::UnicodeSegmentation;

/// Simple word tokenizer for token counting
pub struct SimpleTokenizer;

impl SimpleTokenizer {
    /// Count tokens in text (word-based approximation)
    pub fn count_tokens(text: &str) -> usize {
        text.unicode_words().count()
    }

    /// Split text into tokens
    pub fn tokenize(text: &str) -> Vec<&str> {
        text.unicode_words().collect()
    }
}

/// Token-aware text truncation
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let words: Vec<&str> = text.unicode_words().collect();
    if words.len() <= max_tokens {
        return text.to_string();
    }

    words[..max_tokens].join(" ")
}

/// Turns text into index terms: unicode words, lowercased, optionally stemmed.
///
/// Indexing and querying must go through the same analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer {
    stemming: bool,
}

impl Analyzer {
    pub fn new(stemming: bool) -> Self {
        Self { stemming }
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|word| {
                let lower = word.to_lowercase();
                if self.stemming {
                    stem(&lower)
                } else {
                    lower
                }
            })
            .collect()
    }
}

/// Light English suffix stripper: plurals, then one of -ing/-ed/-ly.
///
/// Only touches ASCII alphabetic words longer than three characters.
pub fn stem(word: &str) -> String {
    if word.len() <= 3 || !word.bytes().all(|b| b.is_ascii_alphabetic()) {
        return word.to_string();
    }

    let mut stem = word;
    let mut owned: Option<String> = None;

    if let Some(base) = stem.strip_suffix("ies").filter(|b| b.len() >= 2) {
        owned = Some(format!("{}y", base));
    } else if let Some(base) = stem.strip_suffix("sses") {
        owned = Some(format!("{}ss", base));
    } else if stem.ends_with('s')
        && !stem.ends_with("ss")
        && !stem.ends_with("us")
        && !stem.ends_with("is")
    {
        stem = &stem[..stem.len() - 1];
    }

    let current = owned.as_deref().unwrap_or(stem);
    for suffix in ["ing", "ed", "ly"] {
        if let Some(base) = current.strip_suffix(suffix) {
            if base.len() >= 3 && base.bytes().any(is_vowel) {
                return base.to_string();
            }
        }
    }

    current.to_string()
}

fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u' | b'y')
}
