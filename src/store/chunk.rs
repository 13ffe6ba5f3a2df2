use crate::error::StoreError;
use crate::store::paths::StorePaths;
use crate::store::record::ObservationRecord;
use crate::store::util::write_atomic;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkMerge {
    pub existing: usize,
    pub incoming: usize,
    pub written: usize,
}

fn corrupt(entity: &str, month: &str, path: &Path, reason: String) -> StoreError {
    StoreError::CorruptChunk {
        entity: entity.to_string(),
        month: month.to_string(),
        path: path.to_path_buf(),
        reason,
    }
}

/// Decompress and parse one chunk file.
pub fn read_chunk_file(
    path: &Path,
    entity: &str,
    month: &str,
) -> Result<Vec<ObservationRecord>, StoreError> {
    let file = File::open(path).map_err(|err| StoreError::io(entity, path, err))?;
    let reader = BufReader::new(GzDecoder::new(file));

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| corrupt(entity, month, path, format!("{err}")))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = serde_json::from_str(trimmed)
            .map_err(|err| corrupt(entity, month, path, format!("line {}: {err}", idx + 1)))?;
        out.push(record);
    }
    Ok(out)
}

/// Existing chunk content for an entity/month; empty when no chunk exists.
pub fn read_chunk(
    paths: &StorePaths,
    entity: &str,
    month: &str,
) -> Result<Vec<ObservationRecord>, StoreError> {
    let path = paths.chunk_file(entity, month);
    match read_chunk_file(&path, entity, month) {
        Err(StoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Union keyed by `observed_at`, incoming records overwriting existing ones,
/// in ascending lexical key order.
pub fn merge_records(
    existing: Vec<ObservationRecord>,
    incoming: Vec<ObservationRecord>,
) -> Vec<ObservationRecord> {
    let mut by_key = BTreeMap::new();
    for record in existing.into_iter().chain(incoming) {
        by_key.insert(record.observed_at.clone(), record);
    }
    by_key.into_values().collect()
}

fn encode(records: &[ObservationRecord]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for record in records {
        serde_json::to_writer(&mut encoder, record)?;
        encoder.write_all(b"\n")?;
    }
    encoder.finish()
}

/// A merged, encoded chunk that has not been written yet.
#[derive(Debug)]
pub struct PreparedChunk {
    pub month: String,
    pub merge: ChunkMerge,
    path: PathBuf,
    bytes: Vec<u8>,
}

/// Read the entity's chunk for `month`, fold `incoming` into it and encode
/// the result. Nothing is written.
pub fn prepare_chunk(
    paths: &StorePaths,
    entity: &str,
    month: &str,
    incoming: Vec<ObservationRecord>,
) -> Result<PreparedChunk, StoreError> {
    let path = paths.chunk_file(entity, month);
    let existing = read_chunk(paths, entity, month)?;
    let stats_existing = existing.len();
    let stats_incoming = incoming.len();

    let merged = merge_records(existing, incoming);
    let bytes = encode(&merged).map_err(|err| StoreError::io(entity, &path, err))?;
    Ok(PreparedChunk {
        month: month.to_string(),
        merge: ChunkMerge {
            existing: stats_existing,
            incoming: stats_incoming,
            written: merged.len(),
        },
        path,
        bytes,
    })
}

impl PreparedChunk {
    /// Replace the chunk file atomically.
    pub fn commit(self, entity: &str) -> Result<ChunkMerge, StoreError> {
        write_atomic(&self.path, &self.bytes)
            .map_err(|err| StoreError::io(entity, &self.path, err))?;
        Ok(self.merge)
    }
}

/// Prepare and commit in one step.
#[cfg(test)]
pub fn merge_into_chunk(
    paths: &StorePaths,
    entity: &str,
    month: &str,
    incoming: Vec<ObservationRecord>,
) -> Result<ChunkMerge, StoreError> {
    prepare_chunk(paths, entity, month, incoming)?.commit(entity)
}
