use anyhow::Result;
use std::env;
use std::path::Path;

use crate::commands::{CommandReport, resolve_store};
use crate::env_loader::active_dotenv;
use crate::store::archiver::{list_active_entities, list_archives};
use crate::store::config::resolve_config_path;

include!(concat!(env!("OUT_DIR"), "/damwatch_env_allowlist.rs"));

fn presence(path: &Path) -> &'static str {
    if path.exists() { "present" } else { "missing" }
}

/// Env vars from the build-time allowlist that are set in this process.
pub fn configured_env_vars() -> Vec<&'static str> {
    GENERATED_DAMWATCH_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let (paths, config) = resolve_store()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!(
        "data_dir={} ({})",
        paths.data_dir.display(),
        presence(&paths.data_dir)
    ));
    report.detail(format!(
        "history_dir={} ({})",
        paths.history_dir.display(),
        presence(&paths.history_dir)
    ));
    report.detail(format!(
        "archive_dir={} ({})",
        paths.archive_dir.display(),
        presence(&paths.archive_dir)
    ));
    report.detail(format!(
        "latest_file={} ({})",
        paths.latest_file.display(),
        presence(&paths.latest_file)
    ));
    report.detail(format!(
        "index_file={} ({})",
        paths.index_file.display(),
        presence(&paths.index_file)
    ));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));

    let config_path = resolve_config_path(&paths.data_dir);
    report.detail(format!(
        "config_file={} ({})",
        config_path.display(),
        presence(&config_path)
    ));
    report.detail(format!("retention_days={}", config.retention.days));
    report.detail(format!("max_workers={}", config.workers.max_workers));

    match active_dotenv() {
        Some(path) => report.detail(format!("dotenv={}", path.display())),
        None => report.detail("dotenv=none"),
    }
    let set = configured_env_vars();
    if set.is_empty() {
        report.detail("env=defaults");
    } else {
        report.detail(format!("env.set={}", set.join(",")));
    }

    match list_active_entities(&paths) {
        Ok(entities) => report.detail(format!("active_logs={}", entities.len())),
        Err(err) => report.issue(format!("active_logs=unreadable ({err:#})")),
    }
    match list_archives(&paths) {
        Ok(listing) => report.detail(format!("archive_chunks={}", listing.files)),
        Err(err) => report.issue(format!("archive_chunks=unreadable ({err:#})")),
    }

    Ok(report)
}
