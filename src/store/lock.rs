use crate::error::StoreError;
use crate::store::paths::StorePaths;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};

/// Advisory per-entity lock held for the duration of one operation on that
/// entity's files. Released on drop.
#[derive(Debug)]
pub struct EntityLock {
    file: File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Ingest and archive: the entity's files may be rewritten.
    Exclusive,
    /// Index and stats: read-only.
    Shared,
}

impl EntityLock {
    pub fn acquire(paths: &StorePaths, entity: &str, mode: LockMode) -> Result<Self, StoreError> {
        fs::create_dir_all(&paths.locks_dir)
            .map_err(|err| StoreError::io(entity, &paths.locks_dir, err))?;
        let path = paths.lock_file(entity);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| StoreError::io(entity, &path, err))?;
        let locked = match mode {
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
            LockMode::Shared => FileExt::lock_shared(&file),
        };
        locked.map_err(|err| StoreError::io(entity, &path, err))?;
        Ok(Self { file })
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn shared_locks_coexist_and_create_lock_file() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());

        let a = EntityLock::acquire(&paths, "E1", LockMode::Shared).expect("first shared");
        let b = EntityLock::acquire(&paths, "E1", LockMode::Shared).expect("second shared");
        assert!(paths.lock_file("E1").exists());
        drop(a);
        drop(b);

        let _c = EntityLock::acquire(&paths, "E1", LockMode::Exclusive).expect("exclusive");
    }
}
