use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, audit_report, resolve_store};
use crate::store::audit;
use crate::store::config::StoreConfig;
use crate::store::ingest::Ingestor;
use crate::store::paths::StorePaths;
use crate::store::snapshot::load_snapshot;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub snapshot: Option<PathBuf>,
}

pub fn run(opts: &IngestOptions) -> Result<CommandReport> {
    let (paths, config) = resolve_store()?;
    run_with(&paths, &config, opts)
}

pub fn run_with(
    paths: &StorePaths,
    config: &StoreConfig,
    opts: &IngestOptions,
) -> Result<CommandReport> {
    let mut report = CommandReport::new("ingest");
    let snapshot_path = opts
        .snapshot
        .clone()
        .unwrap_or_else(|| paths.latest_file.clone());
    report.detail(format!("snapshot={}", snapshot_path.display()));
    report.detail(format!("history_dir={}", paths.history_dir.display()));

    let outcome = load_snapshot(&snapshot_path)
        .and_then(|snapshot| Ingestor::new(paths, config).ingest(&snapshot));
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::record(paths, "ingest", "failed", &format!("{err:#}"));
            return Err(err);
        }
    };

    report.detail(format!("snapshot_records={}", outcome.snapshot_records));
    report.detail(format!("entities={}", outcome.entities.len()));
    report.detail(format!("appended={}", outcome.appended));
    report.detail(format!("skipped_existing={}", outcome.skipped));
    report.entity_failures("ingest", &outcome.failures);

    audit_report(paths, "ingest", &report);
    Ok(report)
}
