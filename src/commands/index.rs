use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, audit_report, resolve_store};
use crate::store::audit;
use crate::store::config::StoreConfig;
use crate::store::index::{IndexBuilder, IndexOutcome, write_index};
use crate::store::paths::StorePaths;
use crate::store::snapshot::load_snapshot;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub snapshot: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

pub fn run(opts: &IndexOptions) -> Result<CommandReport> {
    let (paths, config) = resolve_store()?;
    run_with(&paths, &config, opts)
}

fn build_and_write(
    paths: &StorePaths,
    config: &StoreConfig,
    snapshot_path: &PathBuf,
    output: &PathBuf,
) -> Result<IndexOutcome> {
    let snapshot = load_snapshot(snapshot_path)?;
    let outcome = IndexBuilder::new(paths, config).build(&snapshot)?;
    write_index(output, &outcome.entries)?;
    Ok(outcome)
}

pub fn run_with(
    paths: &StorePaths,
    config: &StoreConfig,
    opts: &IndexOptions,
) -> Result<CommandReport> {
    let mut report = CommandReport::new("index");
    let snapshot_path = opts
        .snapshot
        .clone()
        .unwrap_or_else(|| paths.latest_file.clone());
    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| paths.index_file.clone());
    report.detail(format!("snapshot={}", snapshot_path.display()));
    report.detail(format!("index_file={}", output.display()));

    let outcome = match build_and_write(paths, config, &snapshot_path, &output) {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::record(paths, "index", "failed", &format!("{err:#}"));
            return Err(err);
        }
    };

    report.detail(format!("entries={}", outcome.entries.len()));
    report.detail(format!("entries_with_deltas={}", outcome.with_deltas));
    report.entity_failures("index", &outcome.failures);

    audit_report(paths, "index", &report);
    Ok(report)
}
