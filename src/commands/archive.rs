use anyhow::Result;

use crate::commands::{CommandReport, audit_report, resolve_store};
use crate::store::archiver::{Archiver, list_archives};
use crate::store::audit;
use crate::store::config::{StoreConfig, validate};
use crate::store::paths::StorePaths;

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    pub retention_days: Option<u64>,
    pub dry_run: bool,
}

pub fn run(opts: &ArchiveOptions) -> Result<CommandReport> {
    let (paths, config) = resolve_store()?;
    run_with(&paths, &config, opts)
}

pub fn run_with(
    paths: &StorePaths,
    config: &StoreConfig,
    opts: &ArchiveOptions,
) -> Result<CommandReport> {
    let mut config = config.clone();
    if let Some(days) = opts.retention_days {
        config.retention.days = days;
    }
    validate(&config)?;

    let mut report = CommandReport::new("archive");
    report.detail(format!("history_dir={}", paths.history_dir.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("retention_days={}", config.retention.days));

    let outcome = match Archiver::new(paths, &config).dry_run(opts.dry_run).run() {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::record(paths, "archive", "failed", &format!("{err:#}"));
            return Err(err);
        }
    };

    report.detail(format!("cutoff={}", outcome.cutoff.to_rfc3339()));
    if outcome.dry_run {
        report.detail("archive.dry_run=true");
    }
    report.detail(format!("entities={}", outcome.entities.len()));
    report.detail(format!("kept={}", outcome.kept));
    report.detail(format!("archived={}", outcome.archived));
    for entity in outcome.entities.iter().filter(|e| e.archived > 0) {
        report.detail(format!(
            "archive.entity={} archived={} kept={} months={} log_removed={}",
            entity.entity,
            entity.archived,
            entity.kept,
            entity.months.join(","),
            entity.log_removed
        ));
    }
    let unparseable: usize = outcome.entities.iter().map(|e| e.unparseable).sum();
    if unparseable > 0 {
        report.detail(format!("kept_unparseable={unparseable}"));
    }
    report.entity_failures("archive", &outcome.failures);

    let listing = list_archives(paths)?;
    report.detail(format!("archive.files={}", listing.files));
    report.detail(format!(
        "archive.size_mb={:.2}",
        listing.bytes as f64 / 1024.0 / 1024.0
    ));

    audit_report(paths, "archive", &report);
    Ok(report)
}
