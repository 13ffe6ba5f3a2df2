use anyhow::Result;

use crate::commands::{CommandReport, resolve_store};
use crate::store::stats;

#[derive(Debug, Clone)]
pub struct StatsOptions {
    pub top: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self { top: 5 }
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

pub fn run(opts: &StatsOptions) -> Result<CommandReport> {
    let (paths, _config) = resolve_store()?;
    let mut report = CommandReport::new("stats");
    let summary = stats::collect(&paths, opts.top)?;

    let history = &summary.history;
    report.detail(format!("history.files={}", history.files));
    report.detail(format!("history.records={}", history.records));
    report.detail(format!("history.size_mb={:.2}", mib(history.bytes)));
    for entity in &history.top {
        report.detail(format!(
            "history.top entity={} records={} size_kb={:.1} oldest={} newest={}",
            entity.entity,
            entity.records,
            entity.bytes as f64 / 1024.0,
            entity.oldest.as_deref().unwrap_or("na"),
            entity.newest.as_deref().unwrap_or("na"),
        ));
    }
    for unreadable in &history.unreadable {
        report.detail(format!("history.unreadable {unreadable}"));
    }

    let archives = &summary.archives;
    report.detail(format!("archive.files={}", archives.files));
    report.detail(format!("archive.records={}", archives.records));
    report.detail(format!("archive.size_mb={:.2}", mib(archives.bytes)));
    report.detail(format!(
        "archive.kb_per_record={:.2}",
        archives.bytes as f64 / archives.records.max(1) as f64 / 1024.0
    ));
    for (month, month_stats) in &archives.months {
        report.detail(format!(
            "archive.month={} files={} records={} size_mb={:.2}",
            month,
            month_stats.files,
            month_stats.records,
            mib(month_stats.bytes)
        ));
    }
    for unreadable in &archives.unreadable {
        report.detail(format!("archive.unreadable {unreadable}"));
    }

    match &summary.coverage {
        Some(coverage) => {
            report.detail(format!("coverage.registered={}", coverage.registered));
            report.detail(format!("coverage.with_history={}", coverage.with_history));
            report.detail(format!("coverage.pct={:.1}", coverage.coverage_pct));
            if coverage.missing_total > 0 {
                report.detail(format!(
                    "coverage.missing={} sample={}",
                    coverage.missing_total,
                    coverage.missing.join(",")
                ));
            }
        }
        None => report.detail(format!(
            "coverage=skipped (no snapshot at {})",
            paths.latest_file.display()
        )),
    }

    Ok(report)
}
