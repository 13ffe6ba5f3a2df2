pub mod archive;
pub mod index;
pub mod ingest;
pub mod run;
pub mod stats;
pub mod status;

use crate::error::EntityFailure;
use crate::store::audit;
use crate::store::config::{StoreConfig, load_config};
use crate::store::paths::{StorePaths, resolve_paths};
use crate::store::warn;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn merge(&mut self, mut other: CommandReport) {
        self.ok &= other.ok;
        self.details.append(&mut other.details);
        self.issues.append(&mut other.issues);
    }

    /// Turn entity-scoped failures into report issues and warning lines.
    pub fn entity_failures(&mut self, stage: &str, failures: &[EntityFailure]) {
        for failure in failures {
            warn::emit_failure(stage, failure);
            self.issue(format!(
                "{stage}.failed entity={} code={} error={}",
                failure.entity,
                failure.error.code().as_str(),
                failure.error
            ));
        }
    }
}

pub fn resolve_store() -> Result<(StorePaths, StoreConfig)> {
    let paths = resolve_paths()?;
    let config = load_config(&paths.data_dir)?;
    Ok((paths, config))
}

/// Audit the report outcome for `phase`.
pub fn audit_report(paths: &StorePaths, phase: &str, report: &CommandReport) {
    let status = if report.ok { "ok" } else { "partial" };
    let message = if report.issues.is_empty() {
        report.details.join("; ")
    } else {
        report.issues.join("; ")
    };
    audit::record(paths, phase, status, &message);
}
