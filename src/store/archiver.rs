use crate::error::{EntityFailure, StoreError};
use crate::store::active_log::{read_log_lines, rewrite_active_log};
use crate::store::chunk::prepare_chunk;
use crate::store::config::StoreConfig;
use crate::store::lock::{EntityLock, LockMode};
use crate::store::paths::{
    CHUNK_SUFFIX, StorePaths, entity_from_history_file, validate_entity_id,
};
use crate::store::pool::map_entities;
use crate::store::record::{ObservationRecord, month_key};
use crate::store::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;

/// Result of splitting one active log at the cutoff.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T = ObservationRecord> {
    /// Retained items, original relative order.
    pub kept: Vec<T>,
    /// Aged items grouped by UTC month, each group in original order.
    pub aged: BTreeMap<String, Vec<T>>,
    /// `observed_at` values that could not be parsed and were kept.
    pub unparseable: Vec<String>,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Self {
            kept: Vec::new(),
            aged: BTreeMap::new(),
            unparseable: Vec::new(),
        }
    }
}

impl<T> Partition<T> {
    pub fn aged_count(&self) -> usize {
        self.aged.values().map(Vec::len).sum()
    }
}

/// Items at or after `cutoff` stay; older ones are grouped by month. An item
/// whose age cannot be determined is never archived.
pub fn partition_by<T>(
    items: Vec<T>,
    cutoff: DateTime<Utc>,
    record: impl Fn(&T) -> &ObservationRecord,
) -> Partition<T> {
    let mut out = Partition::default();
    for item in items {
        let observed = record(&item);
        match observed.observed_at_utc() {
            None => {
                out.unparseable.push(observed.observed_at.clone());
                out.kept.push(item);
            }
            Some(ts) if ts >= cutoff => out.kept.push(item),
            Some(ts) => out.aged.entry(month_key(&ts)).or_default().push(item),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityArchive {
    pub entity: String,
    pub kept: usize,
    pub archived: usize,
    pub unparseable: usize,
    pub months: Vec<String>,
    pub log_removed: bool,
}

#[derive(Debug)]
pub struct ArchiveOutcome {
    pub cutoff: DateTime<Utc>,
    pub dry_run: bool,
    pub kept: usize,
    pub archived: usize,
    pub entities: Vec<EntityArchive>,
    pub failures: Vec<EntityFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveListing {
    pub files: usize,
    pub bytes: u64,
}

pub struct Archiver<'a> {
    paths: &'a StorePaths,
    config: &'a StoreConfig,
    dry_run: bool,
}

impl<'a> Archiver<'a> {
    pub fn new(paths: &'a StorePaths, config: &'a StoreConfig) -> Self {
        Self {
            paths,
            config,
            dry_run: false,
        }
    }

    /// Compute partitions and counts without touching any file.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cutoff_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.config.retention.window()
    }

    pub fn run(&self) -> Result<ArchiveOutcome> {
        self.run_at(Utc::now())
    }

    /// Archive every entity with an active log, cutoff fixed once from `now`.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<ArchiveOutcome> {
        let cutoff = self.cutoff_at(now);
        let entities = list_active_entities(self.paths)?;

        let results = map_entities(self.config.workers.max_workers, entities, |entity| {
            let result = self.archive_entity(&entity, cutoff);
            (entity, result)
        })?;

        let mut out = ArchiveOutcome {
            cutoff,
            dry_run: self.dry_run,
            kept: 0,
            archived: 0,
            entities: Vec::new(),
            failures: Vec::new(),
        };
        for (entity, result) in results {
            match result {
                Ok(done) => {
                    out.kept += done.kept;
                    out.archived += done.archived;
                    out.entities.push(done);
                }
                Err(error) => out.failures.push(EntityFailure::new(entity, error)),
            }
        }
        Ok(out)
    }

    fn archive_entity(
        &self,
        entity: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<EntityArchive, StoreError> {
        validate_entity_id(entity)?;
        let lock_mode = if self.dry_run {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        let _lock = EntityLock::acquire(self.paths, entity, lock_mode)?;

        let lines = read_log_lines(self.paths, entity)?;
        let partition = partition_by(lines, cutoff, |line| &line.record);
        for value in &partition.unparseable {
            let kept = StoreError::UnparseableTimestamp {
                entity: entity.to_string(),
                value: value.clone(),
            };
            warn::emit(WarnEvent {
                code: kept.code().as_str(),
                stage: "archive",
                action: "keep-record",
                entity,
                path: &self.paths.history_file(entity).display().to_string(),
                reason: "unparseable-observed-at",
                err: &kept.to_string(),
            });
        }

        let done = EntityArchive {
            entity: entity.to_string(),
            kept: partition.kept.len(),
            archived: partition.aged_count(),
            unparseable: partition.unparseable.len(),
            months: partition.aged.keys().cloned().collect(),
            log_removed: partition.kept.is_empty(),
        };
        if self.dry_run || (partition.aged.is_empty() && !partition.kept.is_empty()) {
            return Ok(done);
        }

        // Every month is read and merged before any chunk is written, so a
        // corrupt chunk leaves the entity untouched.
        let mut prepared = Vec::with_capacity(partition.aged.len());
        for (month, aged) in partition.aged {
            let records = aged.into_iter().map(|line| line.record).collect();
            prepared.push(prepare_chunk(self.paths, entity, &month, records)?);
        }
        // Chunks before the log: a crash in between leaves records in both
        // tiers, and the next run's merge folds them in again.
        for chunk in prepared {
            chunk.commit(entity)?;
        }
        rewrite_active_log(self.paths, entity, &partition.kept)?;
        Ok(done)
    }
}

/// Entity ids that currently have an active log, sorted.
pub fn list_active_entities(paths: &StorePaths) -> Result<Vec<String>> {
    if !paths.history_dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let read_dir = fs::read_dir(&paths.history_dir)
        .with_context(|| format!("failed to read {}", paths.history_dir.display()))?;
    for entry in read_dir {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(entity) = entity_from_history_file(&path) {
            out.push(entity);
        }
    }
    out.sort();
    Ok(out)
}

/// Count and total size of chunk files in the archive directory.
pub fn list_archives(paths: &StorePaths) -> Result<ArchiveListing> {
    let mut out = ArchiveListing::default();
    if !paths.archive_dir.exists() {
        return Ok(out);
    }
    let read_dir = fs::read_dir(&paths.archive_dir)
        .with_context(|| format!("failed to read {}", paths.archive_dir.display()))?;
    for entry in read_dir {
        let entry = entry?;
        let is_chunk = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(CHUNK_SUFFIX));
        if !is_chunk {
            continue;
        }
        out.files += 1;
        out.bytes += entry.metadata()?.len();
    }
    Ok(out)
}
