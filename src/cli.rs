use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::archive::{self, ArchiveOptions};
use crate::commands::index::{self, IndexOptions};
use crate::commands::ingest::{self, IngestOptions};
use crate::commands::run::{self, RunOptions};
use crate::commands::stats::{self, StatsOptions};
use crate::commands::{CommandReport, status};

#[derive(Parser)]
#[command(name = "damwatch")]
#[command(about = "Append-only time-series store for reservoir telemetry", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    pub(crate) json: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Append new observations from the latest snapshot to per-dam history logs.
    Ingest {
        /// Snapshot to read instead of <data_dir>/latest.json.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Move records older than the retention window into monthly gzip chunks.
    Archive {
        /// Override the configured retention window.
        #[arg(long)]
        retention_days: Option<u64>,
        /// Report what would move without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebuild the dams index from the snapshot and the tail of each history log.
    Index {
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Index file to write instead of <data_dir>/dams_index.json.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Ingest, optionally archive, then rebuild the index.
    Run {
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Also run the archiver between ingest and index.
        #[arg(long)]
        archive: bool,
    },

    /// Summarize history logs, archive chunks and snapshot coverage.
    Stats {
        /// How many of the largest history logs to list.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },

    /// Show resolved paths, configuration and env overrides.
    Status,
}

pub(crate) fn render_report(report: &CommandReport) -> String {
    let mut out = format!(
        "{}: {}\n",
        report.command,
        if report.ok { "ok" } else { "issues" }
    );
    for detail in &report.details {
        out.push_str(&format!("  {detail}\n"));
    }
    for issue in &report.issues {
        out.push_str(&format!("  issue: {issue}\n"));
    }
    out
}

fn dispatch(command: Command) -> Result<CommandReport> {
    match command {
        Command::Ingest { snapshot } => ingest::run(&IngestOptions { snapshot }),
        Command::Archive {
            retention_days,
            dry_run,
        } => archive::run(&ArchiveOptions {
            retention_days,
            dry_run,
        }),
        Command::Index { snapshot, output } => index::run(&IndexOptions { snapshot, output }),
        Command::Run { snapshot, archive } => run::run(&RunOptions { snapshot, archive }),
        Command::Stats { top } => stats::run(&StatsOptions { top }),
        Command::Status => status::run(),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = dispatch(cli.command)?;

    if cli.json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to render report as json")?;
        println!("{rendered}");
    } else {
        print!("{}", render_report(&report));
    }

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, render_report};
    use crate::commands::CommandReport;
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["damwatch", "archive", "--dry-run", "--json"])
            .expect("parse");
        assert!(cli.json);
    }

    #[test]
    fn render_lists_issues_after_details() {
        let mut report = CommandReport::new("ingest");
        report.detail("appended=2");
        report.issue("ingest.failed entity=E1");
        let text = render_report(&report);
        assert_eq!(
            text,
            "ingest: issues\n  appended=2\n  issue: ingest.failed entity=E1\n"
        );
    }
}
