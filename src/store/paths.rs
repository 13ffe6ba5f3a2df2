use crate::error::StoreError;
use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

pub const HISTORY_EXT: &str = "ndjson";
pub const CHUNK_SUFFIX: &str = ".ndjson.gz";

#[derive(Debug, Clone)]
pub struct StorePaths {
    pub data_dir: PathBuf,
    pub history_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub latest_file: PathBuf,
    pub index_file: PathBuf,
    pub logs_dir: PathBuf,
    pub locks_dir: PathBuf,
}

impl StorePaths {
    /// Default layout rooted at `data_dir`.
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            history_dir: data_dir.join("history"),
            archive_dir: data_dir.join("archive"),
            latest_file: data_dir.join("latest.json"),
            index_file: data_dir.join("dams_index.json"),
            logs_dir: data_dir.join("logs"),
            locks_dir: data_dir.join("locks"),
            data_dir,
        }
    }

    pub fn history_file(&self, entity: &str) -> PathBuf {
        self.history_dir.join(format!("{entity}.{HISTORY_EXT}"))
    }

    pub fn chunk_file(&self, entity: &str, month: &str) -> PathBuf {
        self.archive_dir.join(format!("{entity}_{month}{CHUNK_SUFFIX}"))
    }

    pub fn lock_file(&self, entity: &str) -> PathBuf {
        self.locks_dir.join(format!("{entity}.lock"))
    }
}

/// Reject ids that would escape or alias a file stem.
pub fn validate_entity_id(entity: &str) -> Result<(), StoreError> {
    let bad = entity.trim().is_empty()
        || entity != entity.trim()
        || entity.starts_with('.')
        || entity.contains(['/', '\\', '\0'])
        || entity.contains("..");
    if bad {
        return Err(StoreError::InvalidEntityId {
            entity: entity.to_string(),
        });
    }
    Ok(())
}

/// Entity id of an active log file, `None` for anything else in the directory.
pub fn entity_from_history_file(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(HISTORY_EXT) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}

/// Split `<entity>_<YYYY-MM>.ndjson.gz` into its entity id and month.
pub fn parse_chunk_file_name(name: &str) -> Option<(String, String)> {
    let stem = name.strip_suffix(CHUNK_SUFFIX)?;
    let (entity, month) = stem.rsplit_once('_')?;
    let valid_month = month.len() == 7
        && month.as_bytes()[4] == b'-'
        && month
            .chars()
            .enumerate()
            .all(|(i, ch)| i == 4 || ch.is_ascii_digit());
    if entity.is_empty() || !valid_month {
        return None;
    }
    Some((entity.to_string(), month.to_string()))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_data_dir() -> PathBuf {
    env_or_default_path("DAMWATCH_DATA_DIR", PathBuf::from("public/data"))
}

pub fn resolve_paths() -> Result<StorePaths> {
    let base = StorePaths::under(resolve_data_dir());

    Ok(StorePaths {
        history_dir: env_or_default_path("DAMWATCH_HISTORY_DIR", base.history_dir),
        archive_dir: env_or_default_path("DAMWATCH_ARCHIVE_DIR", base.archive_dir),
        latest_file: env_or_default_path("DAMWATCH_LATEST_FILE", base.latest_file),
        index_file: env_or_default_path("DAMWATCH_INDEX_FILE", base.index_file),
        logs_dir: env_or_default_path("DAMWATCH_LOGS_DIR", base.logs_dir),
        locks_dir: base.locks_dir,
        data_dir: base.data_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_data_dir() {
        let paths = StorePaths::under("/data");
        assert_eq!(paths.history_file("E1"), PathBuf::from("/data/history/E1.ndjson"));
        assert_eq!(
            paths.chunk_file("E1", "2024-03"),
            PathBuf::from("/data/archive/E1_2024-03.ndjson.gz")
        );
        assert_eq!(paths.lock_file("E1"), PathBuf::from("/data/locks/E1.lock"));
    }

    #[test]
    fn entity_ids_must_be_plain_stems() {
        assert!(validate_entity_id("1368040350020").is_ok());
        assert!(validate_entity_id("dam_01").is_ok());
        assert!(validate_entity_id("").is_err());
        assert!(validate_entity_id("../etc").is_err());
        assert!(validate_entity_id("a/b").is_err());
        assert!(validate_entity_id(".hidden").is_err());
        assert!(validate_entity_id(" pad").is_err());
    }

    #[test]
    fn chunk_names_split_on_last_underscore() {
        assert_eq!(
            parse_chunk_file_name("dam_01_2024-11.ndjson.gz"),
            Some(("dam_01".to_string(), "2024-11".to_string()))
        );
        assert_eq!(parse_chunk_file_name("E1_2024-1.ndjson.gz"), None);
        assert_eq!(parse_chunk_file_name("E1.ndjson"), None);
        assert_eq!(parse_chunk_file_name("_2024-01.ndjson.gz"), None);
    }

    #[test]
    fn history_files_are_recognized_by_extension() {
        assert_eq!(
            entity_from_history_file(Path::new("/h/E1.ndjson")),
            Some("E1".to_string())
        );
        assert_eq!(entity_from_history_file(Path::new("/h/E1.tmp")), None);
        assert_eq!(entity_from_history_file(Path::new("/h/.tmpXYZ.ndjson")), None);
    }
}
