//! Process-local storage backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{LocalStorage, PersistenceError};

/// In-memory [`LocalStorage`].
///
/// Clones share the same slots, the way two handles to one browser profile
/// would. Writes can be switched off to exercise quota-exceeded handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryStorageInner>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    slots: Mutex<HashMap<String, String>>,
    read_only: AtomicBool,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes and deletes fail with
    /// [`PersistenceError::Unavailable`].
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Whether no slot holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.inner.read_only.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl LocalStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.slots().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.slots().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.slots().remove(key);
        Ok(())
    }
}
