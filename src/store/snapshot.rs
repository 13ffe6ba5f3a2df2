use crate::store::record::LatestSnapshot;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read `latest.json`. An unreadable or malformed snapshot fails the run.
pub fn load_snapshot(path: &Path) -> Result<LatestSnapshot> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    Ok(parsed)
}

/// Entity ids in snapshot order, first appearance wins. Entries without an
/// id are skipped here; the ingestor rejects them separately.
pub fn snapshot_entity_ids(snapshot: &LatestSnapshot) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    snapshot
        .records
        .iter()
        .filter_map(|entry| entry.dam_id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
