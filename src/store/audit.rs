use crate::store::paths::StorePaths;
use crate::store::util::now_epoch_secs;
use crate::store::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(paths: &StorePaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.logs_dir.join("audit.log");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Audit failures must not fail the run; they only warn.
pub fn record(paths: &StorePaths, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, phase, status, message) {
        warn::emit(WarnEvent {
            code: "AUDIT_WRITE_FAILED",
            stage: phase,
            action: "append-audit",
            entity: "",
            path: &paths.logs_dir.display().to_string(),
            reason: "audit-log-unwritable",
            err: &format!("{err:#}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_are_appended_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        append_event(&paths, "ingest", "ok", "appended=2").expect("first");
        append_event(&paths, "archive", "ok", "archived=1").expect("second");

        let raw = fs::read_to_string(paths.logs_dir.join("audit.log")).expect("read");
        let events = raw
            .lines()
            .map(|line| serde_json::from_str::<AuditEvent>(line).expect("parse"))
            .collect::<Vec<_>>();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].phase, "archive");
        assert_eq!(events[1].message, "archived=1");
    }
}
