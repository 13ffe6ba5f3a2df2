use crate::error::{EntityFailure, StoreError};
use crate::store::active_log::read_active_log;
use crate::store::archiver::list_active_entities;
use crate::store::chunk::read_chunk_file;
use crate::store::paths::{StorePaths, parse_chunk_file_name};
use crate::store::snapshot::{load_snapshot, snapshot_entity_ids};
use crate::store::warn;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntityHistoryStats {
    pub entity: String,
    pub records: usize,
    pub bytes: u64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryStats {
    pub files: usize,
    pub records: usize,
    pub bytes: u64,
    pub top: Vec<EntityHistoryStats>,
    pub unreadable: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MonthStats {
    pub files: usize,
    pub records: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveStats {
    pub files: usize,
    pub records: usize,
    pub bytes: u64,
    /// Most recent months first.
    pub months: Vec<(String, MonthStats)>,
    pub unreadable: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageStats {
    pub registered: usize,
    pub with_history: usize,
    pub coverage_pct: f64,
    pub missing: Vec<String>,
    pub missing_total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub history: HistoryStats,
    pub archives: ArchiveStats,
    pub coverage: Option<CoverageStats>,
}

const RECENT_MONTHS: usize = 6;
const MISSING_SAMPLE: usize = 10;

// Stats never fails on a bad file; it warns and lists it.
fn unreadable(entity: &str, error: StoreError) -> String {
    let failure = EntityFailure::new(entity, error);
    warn::emit_failure("stats", &failure);
    failure.error.to_string()
}

pub fn history_stats(paths: &StorePaths, top_n: usize) -> Result<HistoryStats> {
    let mut out = HistoryStats::default();
    let mut per_entity = Vec::new();
    for entity in list_active_entities(paths)? {
        let path = paths.history_file(&entity);
        let bytes = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        out.files += 1;
        out.bytes += bytes;

        let records = match read_active_log(paths, &entity) {
            Ok(records) => records,
            Err(err) => {
                out.unreadable.push(unreadable(&entity, err));
                continue;
            }
        };
        out.records += records.len();
        if records.is_empty() {
            continue;
        }
        per_entity.push(EntityHistoryStats {
            entity,
            records: records.len(),
            bytes,
            oldest: records.iter().map(|r| r.observed_at.clone()).min(),
            newest: records.iter().map(|r| r.observed_at.clone()).max(),
        });
    }

    per_entity.sort_by(|a, b| {
        b.records
            .cmp(&a.records)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    per_entity.truncate(top_n);
    out.top = per_entity;
    Ok(out)
}

pub fn archive_stats(paths: &StorePaths) -> Result<ArchiveStats> {
    let mut out = ArchiveStats::default();
    if !paths.archive_dir.exists() {
        return Ok(out);
    }

    let mut months: BTreeMap<String, MonthStats> = BTreeMap::new();
    let read_dir = fs::read_dir(&paths.archive_dir)
        .with_context(|| format!("failed to read {}", paths.archive_dir.display()))?;
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((entity, month)) = parse_chunk_file_name(&name) else {
            continue;
        };
        let bytes = entry.metadata()?.len();
        out.files += 1;
        out.bytes += bytes;

        let slot = months.entry(month.clone()).or_default();
        slot.files += 1;
        slot.bytes += bytes;
        match read_chunk_file(&entry.path(), &entity, &month) {
            Ok(records) => {
                out.records += records.len();
                slot.records += records.len();
            }
            Err(err) => out.unreadable.push(unreadable(&entity, err)),
        }
    }

    out.months = months.into_iter().rev().take(RECENT_MONTHS).collect();
    Ok(out)
}

pub fn coverage_stats(paths: &StorePaths) -> Result<Option<CoverageStats>> {
    if !paths.latest_file.exists() {
        return Ok(None);
    }
    let snapshot = load_snapshot(&paths.latest_file)?;
    let registered = snapshot_entity_ids(&snapshot);
    let with_history = list_active_entities(paths)?
        .into_iter()
        .collect::<BTreeSet<_>>();

    let missing_all = registered
        .iter()
        .filter(|id| !with_history.contains(*id))
        .cloned()
        .collect::<BTreeSet<_>>();
    let missing_total = missing_all.len();

    Ok(Some(CoverageStats {
        registered: registered.len(),
        with_history: with_history.len(),
        coverage_pct: with_history.len() as f64 / registered.len().max(1) as f64 * 100.0,
        missing: missing_all.into_iter().take(MISSING_SAMPLE).collect(),
        missing_total,
    }))
}

/// Read-only summary over active logs, archive chunks and snapshot coverage.
pub fn collect(paths: &StorePaths, top_n: usize) -> Result<StoreStats> {
    Ok(StoreStats {
        history: history_stats(paths, top_n)?,
        archives: archive_stats(paths)?,
        coverage: coverage_stats(paths)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::active_log::append_records;
    use crate::store::chunk::merge_into_chunk;
    use crate::store::record::ObservationRecord;
    use tempfile::tempdir;

    fn record(entity: &str, observed_at: &str) -> ObservationRecord {
        ObservationRecord {
            dam_id: entity.to_string(),
            observed_at: observed_at.to_string(),
            rate_pct: Some(50.0),
            level_m: None,
            source: "test".to_string(),
        }
    }

    #[test]
    fn summarizes_both_tiers_and_coverage() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        append_records(
            &paths,
            "E1",
            &[
                record("E1", "2024-05-02T00:00:00Z"),
                record("E1", "2024-05-01T00:00:00Z"),
            ],
        )
        .expect("E1");
        append_records(&paths, "E2", &[record("E2", "2024-05-01T00:00:00Z")]).expect("E2");
        merge_into_chunk(&paths, "E1", "2024-01", vec![record("E1", "2024-01-05T00:00:00Z")])
            .expect("chunk");
        merge_into_chunk(&paths, "E2", "2023-12", vec![record("E2", "2023-12-05T00:00:00Z")])
            .expect("chunk");
        fs::write(
            &paths.latest_file,
            r#"{"records":[{"dam_id":"E1"},{"dam_id":"E2"},{"dam_id":"E3"},{"dam_id":"E4"}]}"#,
        )
        .expect("latest");

        let stats = collect(&paths, 1).expect("stats");
        assert_eq!(stats.history.files, 2);
        assert_eq!(stats.history.records, 3);
        assert_eq!(stats.history.top.len(), 1);
        assert_eq!(stats.history.top[0].entity, "E1");
        assert_eq!(
            stats.history.top[0].oldest.as_deref(),
            Some("2024-05-01T00:00:00Z")
        );

        assert_eq!(stats.archives.files, 2);
        assert_eq!(stats.archives.records, 2);
        assert_eq!(stats.archives.months[0].0, "2024-01");

        let coverage = stats.coverage.expect("coverage");
        assert_eq!(coverage.registered, 4);
        assert_eq!(coverage.with_history, 2);
        assert_eq!(coverage.coverage_pct, 50.0);
        assert_eq!(coverage.missing, vec!["E3".to_string(), "E4".to_string()]);
    }

    #[test]
    fn empty_store_reports_zeroes() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        let stats = collect(&paths, 5).expect("stats");
        assert_eq!(stats.history.files, 0);
        assert_eq!(stats.archives.files, 0);
        assert!(stats.coverage.is_none());
    }
}
