use crate::error::{EntityFailure, StoreError};
use crate::store::active_log::{KeySet, ScannedKeySet, append_records};
use crate::store::config::StoreConfig;
use crate::store::lock::{EntityLock, LockMode};
use crate::store::paths::{StorePaths, validate_entity_id};
use crate::store::pool::map_entities;
use crate::store::record::{LatestSnapshot, ObservationRecord, ValidEntry};
use anyhow::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIngest {
    pub entity: String,
    pub existing_keys: usize,
    pub appended: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub snapshot_records: usize,
    pub appended: usize,
    pub skipped: usize,
    pub entities: Vec<EntityIngest>,
    pub failures: Vec<EntityFailure>,
}

pub struct Ingestor<'a> {
    paths: &'a StorePaths,
    config: &'a StoreConfig,
}

/// Records from `entries` whose key `keys` has not seen, in input order.
/// Keys are recorded as they are accepted, so repeats inside one snapshot
/// collapse to the first.
pub fn select_new<K: KeySet>(
    keys: &mut K,
    entries: &[ValidEntry<'_>],
    provenance: impl Fn(&ValidEntry<'_>) -> String,
) -> (Vec<ObservationRecord>, usize) {
    let mut fresh = Vec::new();
    let mut skipped = 0usize;
    for entry in entries {
        if keys.contains(entry.observed_at) {
            skipped += 1;
            continue;
        }
        keys.insert(entry.observed_at);
        fresh.push(entry.to_record(provenance(entry)));
    }
    (fresh, skipped)
}

fn group_by_entity<'s>(entries: Vec<ValidEntry<'s>>) -> Vec<(String, Vec<ValidEntry<'s>>)> {
    let mut slots: HashMap<&'s str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ValidEntry<'s>>)> = Vec::new();
    for entry in entries {
        let slot = *slots.entry(entry.dam_id).or_insert_with(|| {
            groups.push((entry.dam_id.to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(entry);
    }
    groups
}

impl<'a> Ingestor<'a> {
    pub fn new(paths: &'a StorePaths, config: &'a StoreConfig) -> Self {
        Self { paths, config }
    }

    /// Append every snapshot reading whose key is absent from its entity's
    /// active log. A record missing `dam_id` or `observed_at` aborts the run
    /// before anything is written.
    pub fn ingest(&self, snapshot: &LatestSnapshot) -> Result<IngestOutcome> {
        let entries = snapshot.validated()?;
        let snapshot_records = entries.len();
        let groups = group_by_entity(entries);

        let results = map_entities(self.config.workers.max_workers, groups, |(entity, items)| {
            let result = self.ingest_entity(snapshot, &entity, &items);
            (entity, result)
        })?;

        let mut out = IngestOutcome {
            snapshot_records,
            ..IngestOutcome::default()
        };
        for (entity, result) in results {
            match result {
                Ok(done) => {
                    out.appended += done.appended;
                    out.skipped += done.skipped;
                    out.entities.push(done);
                }
                Err(error) => out.failures.push(EntityFailure::new(entity, error)),
            }
        }
        Ok(out)
    }

    fn ingest_entity(
        &self,
        snapshot: &LatestSnapshot,
        entity: &str,
        items: &[ValidEntry<'_>],
    ) -> Result<EntityIngest, StoreError> {
        validate_entity_id(entity)?;
        let _lock = EntityLock::acquire(self.paths, entity, LockMode::Exclusive)?;

        let mut keys = ScannedKeySet::scan(self.paths, entity)?;
        let existing_keys = keys.len();
        let (fresh, skipped) =
            select_new(&mut keys, items, |entry| snapshot.provenance_for(entry.entry));
        append_records(self.paths, entity, &fresh)?;

        Ok(EntityIngest {
            entity: entity.to_string(),
            existing_keys,
            appended: fresh.len(),
            skipped,
        })
    }
}
