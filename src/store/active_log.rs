use crate::error::StoreError;
use crate::store::paths::StorePaths;
use crate::store::record::ObservationRecord;
use crate::store::util::{remove_if_exists, write_atomic};
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Membership test for `observed_at` keys already stored for one entity.
///
/// The ingestor only talks to this trait, so the full-scan implementation can
/// be replaced by an indexed lookup without changing what gets appended.
pub trait KeySet {
    fn contains(&self, observed_at: &str) -> bool;
    /// Returns `false` when the key was already present.
    fn insert(&mut self, observed_at: &str) -> bool;
    fn len(&self) -> usize;
}

/// Key set built by scanning the entity's whole active log once.
#[derive(Debug, Default)]
pub struct ScannedKeySet {
    keys: HashSet<String>,
}

impl ScannedKeySet {
    pub fn scan(paths: &StorePaths, entity: &str) -> Result<Self, StoreError> {
        let keys = read_active_log(paths, entity)?
            .into_iter()
            .map(|record| record.observed_at)
            .collect();
        Ok(Self { keys })
    }
}

impl KeySet for ScannedKeySet {
    fn contains(&self, observed_at: &str) -> bool {
        self.keys.contains(observed_at)
    }

    fn insert(&mut self, observed_at: &str) -> bool {
        self.keys.insert(observed_at.to_string())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

fn read_raw(path: &Path, entity: &str) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) if err.kind() == ErrorKind::InvalidData => Err(StoreError::CorruptLog {
            entity: entity.to_string(),
            path: path.to_path_buf(),
            reason: format!("not valid utf-8: {err}"),
        }),
        Err(err) => Err(StoreError::io(entity, path, err)),
    }
}

fn parse_line(
    path: &Path,
    entity: &str,
    line_no: usize,
    line: &str,
) -> Result<ObservationRecord, StoreError> {
    serde_json::from_str(line).map_err(|err| StoreError::CorruptLog {
        entity: entity.to_string(),
        path: path.to_path_buf(),
        reason: format!("line {line_no}: {err}"),
    })
}

/// One active-log line: the parsed record and the text it was stored as.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub record: ObservationRecord,
    pub raw: String,
}

/// Every non-empty line of the entity's active log in file order. A missing
/// log is an empty one.
pub fn read_log_lines(paths: &StorePaths, entity: &str) -> Result<Vec<LogLine>, StoreError> {
    let path = paths.history_file(entity);
    let Some(raw) = read_raw(&path, entity)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(LogLine {
            record: parse_line(&path, entity, idx + 1, trimmed)?,
            raw: trimmed.to_string(),
        });
    }
    Ok(out)
}

/// Every record of the entity's active log in file order.
pub fn read_active_log(
    paths: &StorePaths,
    entity: &str,
) -> Result<Vec<ObservationRecord>, StoreError> {
    Ok(read_log_lines(paths, entity)?
        .into_iter()
        .map(|line| line.record)
        .collect())
}

/// The last `n` records in file order. Only those lines are parsed.
pub fn read_tail(
    paths: &StorePaths,
    entity: &str,
    n: usize,
) -> Result<Vec<ObservationRecord>, StoreError> {
    let path = paths.history_file(entity);
    let Some(raw) = read_raw(&path, entity)? else {
        return Ok(Vec::new());
    };

    let lines = raw
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect::<Vec<_>>();
    let start = lines.len().saturating_sub(n);
    lines[start..]
        .iter()
        .map(|(idx, line)| parse_line(&path, entity, idx + 1, line.trim()))
        .collect()
}

fn render_lines(
    entity: &str,
    path: &Path,
    records: &[ObservationRecord],
) -> Result<String, StoreError> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record).map_err(|err| {
            StoreError::io(entity, path, std::io::Error::new(ErrorKind::InvalidData, err))
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Append records to the end of the entity's active log, creating it if
/// needed. Existing lines are never touched.
pub fn append_records(
    paths: &StorePaths,
    entity: &str,
    records: &[ObservationRecord],
) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }
    let path = paths.history_file(entity);
    fs::create_dir_all(&paths.history_dir)
        .map_err(|err| StoreError::io(entity, &paths.history_dir, err))?;

    let payload = render_lines(entity, &path, records)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| StoreError::io(entity, &path, err))?;
    file.write_all(payload.as_bytes())
        .and_then(|_| file.sync_data())
        .map_err(|err| StoreError::io(entity, &path, err))?;
    Ok(())
}

/// Replace the active log with `lines`, each written back as it was read.
/// An empty set deletes the file.
pub fn rewrite_active_log(
    paths: &StorePaths,
    entity: &str,
    lines: &[LogLine],
) -> Result<(), StoreError> {
    let path = paths.history_file(entity);
    if lines.is_empty() {
        return remove_if_exists(&path).map_err(|err| StoreError::io(entity, &path, err));
    }
    let mut payload = String::new();
    for line in lines {
        payload.push_str(&line.raw);
        payload.push('\n');
    }
    write_atomic(&path, payload.as_bytes()).map_err(|err| StoreError::io(entity, &path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(observed_at: &str, rate: Option<f64>) -> ObservationRecord {
        ObservationRecord {
            dam_id: "E1".to_string(),
            observed_at: observed_at.to_string(),
            rate_pct: rate,
            level_m: None,
            source: "test".to_string(),
        }
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        assert!(read_active_log(&paths, "E1").expect("read").is_empty());
        assert!(read_tail(&paths, "E1", 2).expect("tail").is_empty());
    }

    #[test]
    fn append_then_scan_keys() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        append_records(&paths, "E1", &[record("2024-01-01T00:00:00Z", Some(1.0))])
            .expect("append");
        append_records(&paths, "E1", &[record("2024-01-02T00:00:00Z", Some(2.0))])
            .expect("append");

        let keys = ScannedKeySet::scan(&paths, "E1").expect("scan");
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("2024-01-01T00:00:00Z"));
        assert!(!keys.contains("2024-01-03T00:00:00Z"));
    }

    #[test]
    fn tail_ignores_corruption_outside_window() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        fs::create_dir_all(&paths.history_dir).expect("mkdir");
        let good_a =
            serde_json::to_string(&record("2024-01-02T00:00:00Z", Some(75.0))).expect("json");
        let good_b =
            serde_json::to_string(&record("2024-01-03T00:00:00Z", Some(70.0))).expect("json");
        fs::write(
            paths.history_file("E1"),
            format!("{{broken\n{good_a}\n\n{good_b}\n"),
        )
        .expect("write");

        let tail = read_tail(&paths, "E1", 2).expect("tail");
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].rate_pct, Some(70.0));

        let err = read_active_log(&paths, "E1").expect_err("full read sees corruption");
        assert!(matches!(err, StoreError::CorruptLog { .. }));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn rewrite_with_nothing_deletes_the_log() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        append_records(&paths, "E1", &[record("2024-01-01T00:00:00Z", None)])
            .expect("append");
        rewrite_active_log(&paths, "E1", &[]).expect("rewrite");
        assert!(!paths.history_file("E1").exists());
    }

    #[test]
    fn rewrite_keeps_stored_text_of_each_line() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        fs::create_dir_all(&paths.history_dir).expect("mkdir");
        let stored = concat!(
            r#"{"dam_id":"E1","observed_at":"2024-01-01T00:00:00Z","rate_pct":80,"level_m":null,"gauge":"north"}"#,
            "\n",
            r#"{"dam_id":"E1","observed_at":"2024-01-02T00:00:00Z","rate_pct":79.5,"level_m":null,"source":"feed"}"#,
            "\n",
        );
        fs::write(paths.history_file("E1"), stored).expect("seed");

        let lines = read_log_lines(&paths, "E1").expect("lines");
        assert_eq!(lines[0].record.source, "unknown");
        assert_eq!(lines[0].record.rate_pct, Some(80.0));

        rewrite_active_log(&paths, "E1", &lines).expect("rewrite");
        assert_eq!(
            fs::read_to_string(paths.history_file("E1")).expect("read"),
            stored
        );
    }
}
