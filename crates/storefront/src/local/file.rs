//! File-backed storage backend: one JSON file per slot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{LocalStorage, PersistenceError};

/// [`LocalStorage`] persisting each slot as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves either the old or the new slot, never a torn one.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` for slot files. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_error(key: &str, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        key: key.to_string(),
        source,
    }
}

impl LocalStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.slot_path(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| io_error(key, e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| io_error(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(key, e))
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.slot_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStorage::new(dir.path())
            .write("satchel.cart", "[]")
            .unwrap();

        let reopened = FileStorage::new(dir.path());
        assert_eq!(
            reopened.read("satchel.cart").unwrap().as_deref(),
            Some("[]")
        );
        assert!(dir.path().join("satchel.cart.json").exists());
        assert!(!dir.path().join("satchel.cart.json.tmp").exists());
    }

    #[test]
    fn test_missing_slot_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("not-yet-created"));
        assert!(storage.read("satchel.cart").unwrap().is_none());
    }

    #[test]
    fn test_remove_missing_slot_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.remove("satchel.cart").unwrap();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        for key in ["../escape", "a/b", "", ".hidden"] {
            assert!(matches!(
                storage.write(key, "x"),
                Err(PersistenceError::InvalidKey(_))
            ));
        }
    }
}
