//! Login migration of an anonymous collection into the customer's account.
//!
//! When a visitor signs in with items in their local cart or wishlist, those
//! items are replayed into the remote collection one `add` at a time, in
//! order. The remote store performs its own exists-then-increment check per
//! call, so replays must not run concurrently.
//!
//! Progress is recorded in a [`MigrationJournal`] stored next to the local
//! items. An interrupted migration resumes from the journal and never
//! replays an item twice.

use chrono::Utc;
use satchel_core::{CollectionKind, IdentityKey};
use thiserror::Error;
use tracing::instrument;

use crate::local::{LocalStorage, LocalStore, MigrationJournal, PersistenceError};
use crate::remote::{RemoteCollection, RemoteError};

/// A login migration that did not complete.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Replaying one item failed. Items before it are on the remote.
    #[error("replay of {key} failed after {replayed} item(s): {source}")]
    Replay {
        key: IdentityKey,
        replayed: usize,
        #[source]
        source: RemoteError,
    },

    /// Every item reached the remote but the local slot could not be cleared.
    #[error("failed to purge local collection: {0}")]
    Purge(#[from] PersistenceError),

    /// The local slot was purged but the canonical collection could not be
    /// fetched.
    #[error("failed to refetch remote collection: {0}")]
    Refetch(#[source] RemoteError),
}

impl MigrationError {
    /// Short name of the failed step, for tagging error reports.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Replay { .. } => "replay",
            Self::Purge(_) => "purge",
            Self::Refetch(_) => "refetch",
        }
    }
}

/// Whether signing in with `local` items should migrate them.
///
/// Migration runs when there is something to move and either the account is
/// still empty or an earlier attempt was interrupted.
#[must_use]
pub fn should_migrate<T>(local: &[T], remote: &[T], journal: Option<&MigrationJournal>) -> bool {
    !local.is_empty() && (remote.is_empty() || journal.is_some())
}

/// Replays a local collection into the remote store.
pub struct SyncCoordinator<'a, K: CollectionKind, R, L> {
    remote: &'a R,
    local: &'a LocalStore<K, L>,
}

impl<'a, K, R, L> SyncCoordinator<'a, K, R, L>
where
    K: CollectionKind,
    R: RemoteCollection<K>,
    L: LocalStorage,
{
    pub const fn new(remote: &'a R, local: &'a LocalStore<K, L>) -> Self {
        Self { remote, local }
    }

    /// Replay `items`, purge the local slot, and return the remote's
    /// canonical collection.
    ///
    /// Pass the journal of an interrupted attempt to skip the items it has
    /// already replayed.
    ///
    /// # Errors
    ///
    /// Stops at the first failed replay without purging anything. See
    /// [`MigrationError`] for the other failure points.
    #[instrument(skip_all, fields(collection = K::NAME, items = items.len()))]
    pub async fn migrate(
        &self,
        items: &[K::Item],
        journal: Option<MigrationJournal>,
    ) -> Result<Vec<K::Item>, MigrationError> {
        let resumed = journal.is_some();
        let mut journal = journal.unwrap_or_else(|| MigrationJournal::new(Utc::now()));
        self.record(&journal);

        tracing::info!(
            resumed,
            already_replayed = journal.replayed.len(),
            "Migrating local collection"
        );

        for item in items {
            let key = K::identity(item);
            if journal.is_replayed(&key) {
                tracing::debug!(%key, "Skipping item replayed by an earlier attempt");
                continue;
            }

            self.replay(item, &key)
                .await
                .map_err(|source| MigrationError::Replay {
                    key: key.clone(),
                    replayed: journal.replayed.len(),
                    source,
                })?;

            journal.record(key);
            self.record(&journal);
        }

        self.local.purge()?;

        let canonical = self.remote.fetch().await.map_err(MigrationError::Refetch)?;
        tracing::info!(remote_items = canonical.len(), "Migration complete");
        Ok(canonical)
    }

    async fn replay(&self, item: &K::Item, key: &IdentityKey) -> Result<(), RemoteError> {
        self.remote.add(&K::spec(item)).await?;

        // `add` lands one unit; restore the rest
        let quantity = K::quantity(item);
        if K::QUANTIFIED && quantity > 1 {
            self.remote.set_quantity(key, i64::from(quantity)).await?;
        }
        Ok(())
    }

    fn record(&self, journal: &MigrationJournal) {
        if let Err(e) = self.local.save_journal(journal) {
            tracing::warn!(error = %e, "Failed to persist migration journal");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::local::MemoryStorage;
    use crate::remote::{MemoryRemote, RemoteCall};
    use rust_decimal::Decimal;
    use satchel_core::{Cart, CartItem, ItemSpec, ProductId};

    fn item(id: &str, quantity: u32) -> CartItem {
        let spec = ItemSpec::new(ProductId::parse(id).unwrap(), id, Decimal::from(10), "x");
        CartItem {
            quantity,
            ..CartItem::from_spec(&spec)
        }
    }

    fn local_with(items: &[CartItem]) -> LocalStore<Cart, MemoryStorage> {
        let local = LocalStore::new(MemoryStorage::new());
        local.save(items).unwrap();
        local
    }

    #[test]
    fn test_should_migrate() {
        let a = [item("a", 1)];
        let journal = MigrationJournal::new(Utc::now());

        assert!(should_migrate(&a, &[], None));
        assert!(!should_migrate(&a, &a, None));
        assert!(should_migrate(&a, &a, Some(&journal)));
        assert!(!should_migrate::<CartItem>(&[], &[], Some(&journal)));
    }

    #[tokio::test]
    async fn test_migrates_into_empty_remote_and_purges() {
        let items = [item("a", 1), item("b", 1)];
        let local = local_with(&items);
        let remote = MemoryRemote::<Cart>::new();

        let canonical = SyncCoordinator::new(&remote, &local)
            .migrate(&items, None)
            .await
            .unwrap();

        assert_eq!(canonical, items.to_vec());
        assert_eq!(remote.items(), items.to_vec());
        assert!(local.load().unwrap().is_empty());
        assert!(local.journal().unwrap().is_none());
        assert!(local.storage().is_empty());
    }

    #[tokio::test]
    async fn test_replay_preserves_quantity() {
        let items = [item("a", 3)];
        let local = local_with(&items);
        let remote = MemoryRemote::<Cart>::new();

        SyncCoordinator::new(&remote, &local)
            .migrate(&items, None)
            .await
            .unwrap();

        assert_eq!(remote.items()[0].quantity, 3);
        assert_eq!(
            remote.calls(),
            vec![
                RemoteCall::Add(items[0].identity()),
                RemoteCall::SetQuantity(items[0].identity(), 3),
                RemoteCall::Fetch,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_replay_keeps_local_and_resumes_without_duplicates() {
        let items = [item("a", 1), item("b", 1), item("c", 1)];
        let local = local_with(&items);
        let remote = MemoryRemote::<Cart>::new();
        remote.fail_writes_after(1);

        let err = SyncCoordinator::new(&remote, &local)
            .migrate(&items, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::Replay { ref key, replayed: 1, .. } if *key == items[1].identity()
        ));
        // Nothing purged; the remote holds only the first item
        assert_eq!(local.load().unwrap(), items.to_vec());
        assert_eq!(remote.items(), vec![items[0].clone()]);
        let journal = local.journal().unwrap().unwrap();
        assert_eq!(journal.replayed, vec![items[0].identity()]);

        remote.restore();
        SyncCoordinator::new(&remote, &local)
            .migrate(&items, Some(journal))
            .await
            .unwrap();

        assert_eq!(remote.items(), items.to_vec());
        assert!(remote.items().iter().all(|i| i.quantity == 1));
        assert!(local.storage().is_empty());
    }

    #[tokio::test]
    async fn test_purge_failure_reported() {
        let items = [item("a", 1)];
        let local = local_with(&items);
        let remote = MemoryRemote::<Cart>::new();
        local.storage().set_read_only(true);

        let err = SyncCoordinator::new(&remote, &local)
            .migrate(&items, None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "purge");
        assert_eq!(remote.items(), items.to_vec());
        assert_eq!(local.load().unwrap(), items.to_vec());
    }
}
