use anyhow::{Result, anyhow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_RETENTION_DAYS: u64 = 365_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 90 }
    }
}

impl RetentionConfig {
    pub fn window(&self) -> Duration {
        Duration::days(self.days.min(MAX_RETENTION_DAYS) as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub max_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    pub retention: RetentionConfig,
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStoreConfig {
    retention: Option<RetentionConfig>,
    workers: Option<WorkerConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

pub fn validate(cfg: &StoreConfig) -> Result<()> {
    if cfg.retention.days == 0 {
        return Err(anyhow!("invalid retention window: must be >= 1 day"));
    }
    if cfg.retention.days > MAX_RETENTION_DAYS {
        return Err(anyhow!(
            "invalid retention window: must be <= {MAX_RETENTION_DAYS} days"
        ));
    }
    if cfg.workers.max_workers == 0 {
        return Err(anyhow!("invalid max workers: must be >= 1"));
    }
    Ok(())
}

pub fn resolve_config_path(data_dir: &Path) -> PathBuf {
    if let Ok(custom) = env::var("DAMWATCH_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    data_dir.join("damwatch.toml")
}

fn merge_file_config(base: &mut StoreConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("failed to read config {}: {err}", path.display()))?;
    let parsed: PartialStoreConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(retention) = parsed.retention {
        base.retention = retention;
    }
    if let Some(workers) = parsed.workers {
        base.workers = workers;
    }
    Ok(())
}

/// Defaults, then the TOML file, then `DAMWATCH_*` env overrides.
pub fn load_config(data_dir: &Path) -> Result<StoreConfig> {
    let mut cfg = StoreConfig::default();
    merge_file_config(&mut cfg, &resolve_config_path(data_dir))?;

    cfg.retention.days = env_or_u64("DAMWATCH_RETENTION_DAYS", cfg.retention.days);
    cfg.workers.max_workers = env_or_usize("DAMWATCH_MAX_WORKERS", cfg.workers.max_workers);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_ninety_days_and_four_workers() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.retention.days, 90);
        assert_eq!(cfg.retention.window(), Duration::days(90));
        assert_eq!(cfg.workers.max_workers, 4);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn zero_retention_is_rejected() {
        let mut cfg = StoreConfig::default();
        cfg.retention.days = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn file_sections_override_defaults() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("damwatch.toml");
        fs::write(&path, "[retention]\ndays = 30\n").expect("write config");

        let mut cfg = StoreConfig::default();
        merge_file_config(&mut cfg, &path).expect("merge");
        assert_eq!(cfg.retention.days, 30);
        assert_eq!(cfg.workers.max_workers, 4);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("damwatch.toml");
        fs::write(&path, "[retention\n").expect("write config");

        let mut cfg = StoreConfig::default();
        let err = merge_file_config(&mut cfg, &path).expect_err("should fail");
        assert!(err.to_string().contains("failed to parse config"));
    }
}
