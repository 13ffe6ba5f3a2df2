use anyhow::Result;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Replace `path` with `bytes` via a sibling temp file and rename, so readers
/// see either the old content or the new one, never a prefix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_temp_files() {
        let tmp = tempdir().expect("tempdir");
        let target = tmp.path().join("nested").join("file.json");

        write_atomic(&target, b"first\n").expect("first write");
        write_atomic(&target, b"second\n").expect("second write");

        assert_eq!(fs::read_to_string(&target).expect("read"), "second\n");
        let entries = fs::read_dir(target.parent().expect("parent"))
            .expect("read dir")
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn removing_missing_file_is_ok() {
        let tmp = tempdir().expect("tempdir");
        assert!(remove_if_exists(&tmp.path().join("absent")).is_ok());
    }
}
