use crate::error::{EntityFailure, StoreError};
use crate::store::active_log::read_tail;
use crate::store::config::StoreConfig;
use crate::store::lock::{EntityLock, LockMode};
use crate::store::paths::{StorePaths, validate_entity_id};
use crate::store::pool::map_entities;
use crate::store::record::{DerivedIndexEntry, LatestSnapshot, ObservationRecord};
use crate::store::util::write_atomic;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// The three derived fields of an index entry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Deltas {
    pub last: Option<f64>,
    /// Approximation: consecutive active-log samples are assumed to be about
    /// a day apart, so this is the last-interval delta, not a lookback.
    pub day: Option<f64>,
    /// Placeholder proxy equal to `day`.
    pub slope_per_day: Option<f64>,
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Deltas from the last two active-log records. Fewer than two records, or
/// a missing rate on either, yields all nulls.
pub fn derive_deltas(tail: &[ObservationRecord]) -> Deltas {
    let [.., prev, last] = tail else {
        return Deltas::default();
    };
    let (Some(prev_rate), Some(last_rate)) = (prev.rate_pct, last.rate_pct) else {
        return Deltas::default();
    };
    let last = Some(round1(last_rate - prev_rate));
    Deltas {
        last,
        day: last,
        slope_per_day: last,
    }
}

/// Fields the index computes itself; a snapshot value under the same name is
/// dropped so every key appears once.
const DERIVED_KEYS: &[&str] = &[
    "dam_id",
    "updated_at",
    "rate_pct",
    "level_m",
    "delta_pct_last",
    "delta_pct_24h",
    "slope_pct_per_day",
];

fn passthrough_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    metadata
        .iter()
        .filter(|(key, _)| !DERIVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub entries: Vec<DerivedIndexEntry>,
    pub with_deltas: usize,
    pub failures: Vec<EntityFailure>,
}

pub struct IndexBuilder<'a> {
    paths: &'a StorePaths,
    config: &'a StoreConfig,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(paths: &'a StorePaths, config: &'a StoreConfig) -> Self {
        Self { paths, config }
    }

    /// One entry per snapshot record, in snapshot order. An entity whose
    /// log cannot be read still gets an entry, with null deltas, and is
    /// listed in `failures`.
    pub fn build(&self, snapshot: &LatestSnapshot) -> Result<IndexOutcome> {
        let entries = snapshot.validated()?;

        let results = map_entities(self.config.workers.max_workers, entries, |entry| {
            let deltas = self.deltas_for(entry.dam_id);
            let derived = DerivedIndexEntry {
                dam_id: entry.dam_id.to_string(),
                metadata: passthrough_metadata(&entry.entry.metadata),
                updated_at: entry.observed_at.to_string(),
                rate_pct: entry.entry.rate_pct,
                level_m: entry.entry.level_m,
                delta_pct_last: None,
                delta_pct_24h: None,
                slope_pct_per_day: None,
            };
            (derived, deltas)
        })?;

        let mut out = IndexOutcome::default();
        for (mut derived, deltas) in results {
            match deltas {
                Ok(deltas) => {
                    if deltas.last.is_some() {
                        out.with_deltas += 1;
                    }
                    derived.delta_pct_last = deltas.last;
                    derived.delta_pct_24h = deltas.day;
                    derived.slope_pct_per_day = deltas.slope_per_day;
                }
                Err(error) => out
                    .failures
                    .push(EntityFailure::new(derived.dam_id.clone(), error)),
            }
            out.entries.push(derived);
        }
        Ok(out)
    }

    fn deltas_for(&self, entity: &str) -> Result<Deltas, StoreError> {
        validate_entity_id(entity)?;
        let _lock = EntityLock::acquire(self.paths, entity, LockMode::Shared)?;
        let tail = read_tail(self.paths, entity, 2)?;
        Ok(derive_deltas(&tail))
    }
}

/// Write the index as a pretty-printed JSON array, replacing any previous one
/// atomically.
pub fn write_index(path: &Path, entries: &[DerivedIndexEntry]) -> Result<()> {
    let data = serde_json::to_string_pretty(entries)?;
    write_atomic(path, format!("{data}\n").as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
