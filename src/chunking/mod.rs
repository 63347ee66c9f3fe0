//! Document chunking
//!
//! Features:
//! - Word-window splitting with configurable overlap
//! - Sentence-aware passage boundaries
//! - Stable passage ids derived from character offsets
//! - Optional noise cleaning and the term analyzer shared by the lexical index

mod cleaner;
mod splitter;
mod tokenizer;

pub use cleaner::*;
pub use splitter::*;
pub use tokenizer::*;
