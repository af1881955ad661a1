//! Local Store adapter.
//!
//! Anonymous visitors have no server identity, so their cart and wishlist
//! live in a local key/value slot. Each collection flavor owns a disjoint,
//! namespaced slot (`satchel.cart`, `satchel.wishlist`) holding the item list
//! as a JSON array, plus a journal slot used while migrating that list to the
//! remote store on login.
//!
//! Reads and writes are synchronous. Storage backends implement
//! [`LocalStorage`]; [`LocalStore`] layers the typed slot handling on top.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use satchel_core::{CollectionKind, IdentityKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix shared by every slot this crate writes.
pub const SLOT_PREFIX: &str = "satchel";

/// Errors from the local persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the backing medium failed.
    #[error("I/O error on slot {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The slot exists but does not hold the expected JSON.
    #[error("slot {key} holds malformed data: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be serialized.
    #[error("failed to serialize slot {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The slot key contains characters the backend cannot store.
    #[error("invalid slot key: {0}")]
    InvalidKey(String),

    /// The backend refused the write (e.g. quota exceeded).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A synchronous string key/value store.
pub trait LocalStorage: Send + Sync {
    /// Read a slot. `Ok(None)` when nothing has been written.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Overwrite a slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend refuses the write.
    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Delete a slot. Deleting an absent slot succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot delete the slot.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Durable record of a login migration in progress.
///
/// Written before the first replay and updated after each successful one,
/// so an interrupted migration can resume without replaying an item twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJournal {
    pub started_at: DateTime<Utc>,
    pub replayed: Vec<IdentityKey>,
}

impl MigrationJournal {
    #[must_use]
    pub const fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            replayed: Vec::new(),
        }
    }

    /// Whether the item with this key has already reached the remote store.
    #[must_use]
    pub fn is_replayed(&self, key: &IdentityKey) -> bool {
        self.replayed.contains(key)
    }

    pub fn record(&mut self, key: IdentityKey) {
        if !self.is_replayed(&key) {
            self.replayed.push(key);
        }
    }
}

/// Typed access to one collection flavor's local slots.
#[derive(Debug, Clone)]
pub struct LocalStore<K: CollectionKind, L> {
    storage: L,
    items_key: String,
    journal_key: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K: CollectionKind, L: LocalStorage> LocalStore<K, L> {
    /// Bind the `K` slots of a storage backend.
    pub fn new(storage: L) -> Self {
        Self {
            storage,
            items_key: format!("{SLOT_PREFIX}.{}", K::NAME),
            journal_key: format!("{SLOT_PREFIX}.{}.migration", K::NAME),
            _kind: PhantomData,
        }
    }

    /// The backing storage.
    pub const fn storage(&self) -> &L {
        &self.storage
    }

    /// Slot key holding the item list.
    #[must_use]
    pub fn items_key(&self) -> &str {
        &self.items_key
    }

    /// Read the persisted item list. An absent slot is an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot cannot be read or does not parse.
    pub fn load(&self) -> Result<Vec<K::Item>, PersistenceError> {
        Ok(self.read_json(&self.items_key)?.unwrap_or_default())
    }

    /// Overwrite the persisted item list.
    ///
    /// # Errors
    ///
    /// Returns an error when the list cannot be serialized or written.
    pub fn save(&self, items: &[K::Item]) -> Result<(), PersistenceError> {
        self.write_json(&self.items_key, &items)
    }

    /// Read the migration journal, if a migration was started.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot cannot be read or does not parse.
    pub fn journal(&self) -> Result<Option<MigrationJournal>, PersistenceError> {
        self.read_json(&self.journal_key)
    }

    /// Persist the migration journal.
    ///
    /// # Errors
    ///
    /// Returns an error when the journal cannot be written.
    pub fn save_journal(&self, journal: &MigrationJournal) -> Result<(), PersistenceError> {
        self.write_json(&self.journal_key, journal)
    }

    /// Delete the migration journal.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot cannot be deleted.
    pub fn discard_journal(&self) -> Result<(), PersistenceError> {
        self.storage.remove(&self.journal_key)
    }

    /// Delete the item list and then the journal.
    ///
    /// # Errors
    ///
    /// Returns the first deletion error; the journal survives a failed item
    /// deletion so the migration can be resumed.
    pub fn purge(&self) -> Result<(), PersistenceError> {
        self.storage.remove(&self.items_key)?;
        self.storage.remove(&self.journal_key)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError> {
        let Some(raw) = self.storage.read(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Malformed {
                key: key.to_string(),
                source,
            })
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(value).map_err(|source| PersistenceError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.storage.write(key, &raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use satchel_core::{Cart, CartItem, ItemSpec, ProductId, Wishlist, WishlistItem};

    fn resin() -> ItemSpec {
        ItemSpec::new(ProductId::parse("p1").unwrap(), "Resin", Decimal::from(1359), "x")
    }

    #[test]
    fn test_missing_slot_loads_empty() {
        let store = LocalStore::<Cart, _>::new(MemoryStorage::new());
        assert!(store.load().unwrap().is_empty());
        assert!(store.journal().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let store = LocalStore::<Cart, _>::new(MemoryStorage::new());
        let item = CartItem::from_spec(&resin());
        store.save(std::slice::from_ref(&item)).unwrap();
        assert_eq!(store.load().unwrap(), vec![item]);
    }

    #[test]
    fn test_slots_are_disjoint_per_kind() {
        let storage = MemoryStorage::new();
        let cart = LocalStore::<Cart, _>::new(storage.clone());
        let wishlist = LocalStore::<Wishlist, _>::new(storage.clone());

        cart.save(&[CartItem::from_spec(&resin())]).unwrap();

        assert!(wishlist.load().unwrap().is_empty());
        assert_eq!(cart.items_key(), "satchel.cart");
        assert_eq!(wishlist.items_key(), "satchel.wishlist");
        assert!(storage.read("satchel.cart").unwrap().is_some());
    }

    #[test]
    fn test_malformed_slot_is_an_error() {
        let storage = MemoryStorage::new();
        storage.write("satchel.wishlist", "{not json").unwrap();
        let store = LocalStore::<Wishlist, _>::new(storage);
        assert!(matches!(
            store.load(),
            Err(PersistenceError::Malformed { .. })
        ));
    }

    #[test]
    fn test_slot_is_a_json_array() {
        let storage = MemoryStorage::new();
        let store = LocalStore::<Wishlist, _>::new(storage.clone());
        store
            .save(&[WishlistItem::from_spec(&resin(), Utc::now())])
            .unwrap();

        let raw = storage.read("satchel.wishlist").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["productId"], "p1");
    }

    #[test]
    fn test_purge_removes_items_and_journal() {
        let storage = MemoryStorage::new();
        let store = LocalStore::<Cart, _>::new(storage.clone());
        store.save(&[CartItem::from_spec(&resin())]).unwrap();
        store.save_journal(&MigrationJournal::new(Utc::now())).unwrap();

        store.purge().unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(store.journal().unwrap().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_journal_records_each_key_once() {
        let key = resin().identity();
        let mut journal = MigrationJournal::new(Utc::now());
        journal.record(key.clone());
        journal.record(key.clone());
        assert_eq!(journal.replayed, vec![key.clone()]);
        assert!(journal.is_replayed(&key));
    }
}
