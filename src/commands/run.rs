use anyhow::Result;
use std::path::PathBuf;

use crate::commands::archive::{self, ArchiveOptions};
use crate::commands::index::{self, IndexOptions};
use crate::commands::ingest::{self, IngestOptions};
use crate::commands::{CommandReport, resolve_store};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub snapshot: Option<PathBuf>,
    pub archive: bool,
}

/// One batch: ingest, optionally archive, then rebuild the index. Stages run
/// one after another, so an entity is never touched by two stages at once.
pub fn run(opts: &RunOptions) -> Result<CommandReport> {
    let (paths, config) = resolve_store()?;
    let mut report = CommandReport::new("run");

    report.merge(ingest::run_with(
        &paths,
        &config,
        &IngestOptions {
            snapshot: opts.snapshot.clone(),
        },
    )?);

    if opts.archive {
        report.merge(archive::run_with(
            &paths,
            &config,
            &ArchiveOptions::default(),
        )?);
    } else {
        report.detail("archive=skipped (pass --archive to age out old records)");
    }

    report.merge(index::run_with(
        &paths,
        &config,
        &IndexOptions {
            snapshot: opts.snapshot.clone(),
            output: None,
        },
    )?);

    Ok(report)
}
