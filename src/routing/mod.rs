//! Domain routing
//!
//! Features:
//! - Query-side domain filters shared by the dense and lexical lookups
//! - Ingest-side domain assignment with keyword detection for untagged documents

mod detect;
mod router;

pub use detect::*;
pub use router::*;
