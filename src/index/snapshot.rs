//! Self-describing index snapshots
//!
//! A snapshot is one JSON file holding the settings the index was built with,
//! every passage with its vector (hex-encoded little-endian f32), and a
//! SHA-256 checksum over the passage payload.

use super::{HybridIndex, IndexSettings};
use crate::error::{Error, Result};
use crate::types::Passage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const SNAPSHOT_FORMAT: &str = "techdoc-hybrid-index";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    format: String,
    version: u32,
    created_at: DateTime<Utc>,
    settings: IndexSettings,
    dimensions: usize,
    generation: u64,
    checksum: String,
    passages: Vec<SnapshotPassage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPassage {
    passage: Passage,
    vector: String,
}

impl HybridIndex {
    /// Write a snapshot of the current generation to `path`.
    ///
    /// The file is written next to `path` and renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let snapshot = {
            let state = self.read();
            let mut passages = Vec::with_capacity(state.store().passage_count());
            for passage in state.store().passages_sorted() {
                let record = state.vectors().get(&passage.id).ok_or_else(|| {
                    Error::corruption(&passage.id, "missing from vector index, refusing to save")
                })?;
                passages.push(SnapshotPassage {
                    passage: passage.clone(),
                    vector: encode_vector(&record.vector),
                });
            }

            Snapshot {
                format: SNAPSHOT_FORMAT.to_string(),
                version: SNAPSHOT_VERSION,
                created_at: Utc::now(),
                settings: self.settings().clone(),
                dimensions: self.dimensions(),
                generation: state.generation(),
                checksum: checksum(&passages),
                passages,
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path)?;
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        info!(
            "Saved snapshot with {} passages to {}",
            snapshot.passages.len(),
            path.display()
        );
        Ok(())
    }

    /// Rebuild an index from a snapshot, using the settings recorded in it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading snapshot from {}", path.display());

        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)
            .map_err(|e| Error::Snapshot(format!("malformed snapshot: {}", e)))?;

        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(Error::Snapshot(format!(
                "unknown snapshot format '{}'",
                snapshot.format
            )));
        }
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        let actual = checksum(&snapshot.passages);
        if actual != snapshot.checksum {
            return Err(Error::Snapshot(format!(
                "checksum mismatch: recorded {}, computed {}",
                snapshot.checksum, actual
            )));
        }

        let index = HybridIndex::new(snapshot.dimensions, snapshot.settings);

        let mut documents: BTreeMap<String, Vec<Passage>> = BTreeMap::new();
        let passage_count = snapshot.passages.len();
        for entry in snapshot.passages {
            let mut passage = entry.passage;
            passage.embedding = Some(decode_vector(&entry.vector, snapshot.dimensions)?);
            documents
                .entry(passage.document_id.clone())
                .or_default()
                .push(passage);
        }

        {
            let mut state = index.state.write();
            for (document_id, passages) in documents {
                state.replace_document(&document_id, passages)?;
            }
            state.generation = snapshot.generation;
        }

        info!(
            "Loaded snapshot with {} passages (generation {})",
            passage_count, snapshot.generation
        );
        Ok(index)
    }
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Snapshot(format!("invalid snapshot path {}", path.display())))?;
    let mut tmp_name = name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

fn encode_vector(vector: &[f32]) -> String {
    let bytes: Vec<u8> = vector.iter().flat_map(|x| x.to_le_bytes()).collect();
    hex::encode(bytes)
}

fn decode_vector(encoded: &str, dimensions: usize) -> Result<Vec<f32>> {
    let bytes = hex::decode(encoded)
        .map_err(|e| Error::Snapshot(format!("invalid vector encoding: {}", e)))?;
    if bytes.len() != dimensions * 4 {
        return Err(Error::DimensionMismatch {
            expected: dimensions,
            actual: bytes.len() / 4,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// SHA-256 over every field of every passage, in file order
fn checksum(passages: &[SnapshotPassage]) -> String {
    let mut hasher = Sha256::new();
    for entry in passages {
        let p = &entry.passage;
        for field in [
            p.id.as_str(),
            p.document_id.as_str(),
            p.domain.as_str(),
            p.text.as_str(),
            entry.vector.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        for number in [p.span.start, p.span.end, p.ordinal, p.token_count] {
            hasher.update((number as u64).to_le_bytes());
        }
        hasher.update(p.ingested_at.to_rfc3339().as_bytes());
    }
    hex::encode(hasher.finalize())
}
