//! Preparing retrieved passages for an external generator

use crate::chunking::{truncate_to_tokens, SimpleTokenizer};
use crate::types::ScoredPassage;
use std::collections::VecDeque;

/// "Lost in the middle" reordering: given passages best first, place the
/// strongest at both ends and the weakest in the middle.
pub fn reorder_long_context(passages: Vec<ScoredPassage>) -> Vec<ScoredPassage> {
    let mut reordered = VecDeque::with_capacity(passages.len());
    for (i, passage) in passages.into_iter().rev().enumerate() {
        if i % 2 == 1 {
            reordered.push_back(passage);
        } else {
            reordered.push_front(passage);
        }
    }
    reordered.into()
}

/// Join passage texts with blank lines, stopping at `max_tokens`.
///
/// The passage that crosses the budget is truncated rather than dropped.
pub fn assemble_context(passages: &[ScoredPassage], max_tokens: usize) -> String {
    let mut parts = Vec::new();
    let mut used = 0;

    for scored in passages {
        if used >= max_tokens {
            break;
        }
        let text = scored.passage.text.trim();
        let tokens = SimpleTokenizer::count_tokens(text);
        if used + tokens <= max_tokens {
            parts.push(text.to_string());
            used += tokens;
        } else {
            parts.push(truncate_to_tokens(text, max_tokens - used));
            used = max_tokens;
        }
    }

    parts.join("\n\n")
}
