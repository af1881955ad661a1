//! The collection state container.
//!
//! A [`CollectionStore`] owns the live cart or wishlist shown to the
//! customer. It decides where each mutation goes:
//!
//! - **Anonymous**: through the reducer, then written back to the local slot.
//! - **Authenticated**: to the remote store, adopting the server's returned
//!   list. Transient failures degrade to the reducer in memory; rejections
//!   are returned as [`StoreError`] with the state untouched.
//! - **Unmigrated**: a login whose migration (or first fetch) failed. The
//!   local items stay on screen and the next mutation retries the login
//!   hydration before falling back to the anonymous path.
//!
//! A mutation issued while the store is loading or migrating waits for that
//! hydration to settle and is then routed by the resulting mode.
//!
//! State lives in `tokio::sync::watch` channels so the UI can subscribe to
//! changes. No lock is held across an `.await`: two overlapping mutations
//! both adopt their server response, and the last response to arrive wins.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use satchel_core::{Collection, CollectionKind, IdentityKey, ItemSpec, Mutation, ReduceError};
use tokio::sync::watch;
use tracing::instrument;

use crate::error::{self, Result, StoreError};
use crate::local::{LocalStorage, LocalStore};
use crate::remote::{RemoteCollection, RemoteError};
use crate::sync::{MigrationError, SyncCoordinator, should_migrate};

/// Authentication state handed to the store.
#[derive(Debug)]
pub enum Session<R> {
    Anonymous,
    /// Signed in, with the customer's remote collection.
    Authenticated(R),
}

/// Which storage location is authoritative once the store is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Local slot, no customer.
    Anonymous,
    /// Remote collection of a signed-in customer.
    Authenticated,
    /// Signed in, but the local collection has not reached the remote yet.
    Unmigrated,
}

/// Lifecycle of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    LoadingLocal,
    LoadingRemote,
    Migrating,
    Ready(Mode),
}

impl Phase {
    /// The mode, once hydration has finished.
    #[must_use]
    pub const fn mode(self) -> Option<Mode> {
        match self {
            Self::Ready(mode) => Some(mode),
            _ => None,
        }
    }
}

/// Live cart or wishlist with dual-mode persistence.
pub struct CollectionStore<K: CollectionKind, R, L> {
    local: LocalStore<K, L>,
    remote: Mutex<Option<Arc<R>>>,
    state: watch::Sender<Collection<K>>,
    phase: watch::Sender<Phase>,
    in_flight: watch::Sender<usize>,
}

impl<K: CollectionKind, R, L> std::fmt::Debug for CollectionStore<K, R, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("collection", &K::NAME)
            .field("phase", &*self.phase.borrow())
            .field("items", &self.state.borrow().len())
            .field("in_flight", &*self.in_flight.borrow())
            .finish_non_exhaustive()
    }
}

/// Marks the store busy for its lifetime.
struct BusyGuard<'a> {
    in_flight: &'a watch::Sender<usize>,
}

impl<'a> BusyGuard<'a> {
    fn enter(in_flight: &'a watch::Sender<usize>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self { in_flight }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl<K, R, L> CollectionStore<K, R, L>
where
    K: CollectionKind,
    R: RemoteCollection<K>,
    L: LocalStorage,
{
    /// Create a store over `storage` and hydrate it for `session`.
    pub async fn mount(storage: L, session: Session<R>) -> Self {
        let store = Self {
            local: LocalStore::new(storage),
            remote: Mutex::new(None),
            state: watch::Sender::new(Collection::empty()),
            phase: watch::Sender::new(Phase::Uninitialized),
            in_flight: watch::Sender::new(0),
        };
        store.set_session(session).await;
        store
    }

    /// Switch authentication state and re-hydrate.
    ///
    /// Signing in migrates a non-empty local collection into the account.
    /// Signing out shows the local collection again; the remote collection
    /// is not carried over.
    #[instrument(skip_all, fields(collection = K::NAME, authenticated))]
    pub async fn set_session(&self, session: Session<R>) {
        let _busy = BusyGuard::enter(&self.in_flight);

        match session {
            Session::Anonymous => {
                tracing::Span::current().record("authenticated", false);
                self.replace_remote(None);
                self.hydrate_local();
            }
            Session::Authenticated(remote) => {
                tracing::Span::current().record("authenticated", true);
                let remote = Arc::new(remote);
                self.replace_remote(Some(Arc::clone(&remote)));
                self.hydrate_remote(&remote).await;
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of a product, or mark it present on a wishlist.
    ///
    /// Adding a product a wishlist already holds changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a signed-in customer's change is refused.
    #[instrument(skip_all, fields(collection = K::NAME, key = %K::spec_identity(&spec)))]
    pub async fn add_item(&self, spec: ItemSpec) -> Result<()> {
        self.dispatch(Mutation::Add(spec)).await
    }

    /// Remove an item. Removing an absent item changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a signed-in customer's change is refused.
    #[instrument(skip(self), fields(collection = K::NAME, %key))]
    pub async fn remove_item(&self, key: IdentityKey) -> Result<()> {
        self.dispatch(Mutation::Remove(key)).await
    }

    /// Set an item's quantity. Zero or below removes it.
    ///
    /// Wishlist entries have no quantity: a positive value leaves them as is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a signed-in customer's change is refused.
    #[instrument(skip(self), fields(collection = K::NAME, %key))]
    pub async fn update_quantity(&self, key: IdentityKey, quantity: i64) -> Result<()> {
        let mutation = if K::QUANTIFIED {
            Mutation::SetQuantity(key, quantity)
        } else if quantity <= 0 {
            Mutation::Remove(key)
        } else {
            return Ok(());
        };
        self.dispatch(mutation).await
    }

    /// Empty the collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a signed-in customer's change is refused.
    #[instrument(skip(self), fields(collection = K::NAME))]
    pub async fn clear(&self) -> Result<()> {
        self.dispatch(Mutation::Clear).await
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// Items in display order.
    #[must_use]
    pub fn items(&self) -> Vec<K::Item> {
        self.state.borrow().items().to_vec()
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.state.borrow().total()
    }

    /// Sum of quantities (entry count for a wishlist).
    #[must_use]
    pub fn count(&self) -> u32 {
        self.state.borrow().item_count()
    }

    /// Whether a mutation or hydration is in flight. Advisory only.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Whether a customer's remote collection is bound, including while it
    /// is still being hydrated.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.current_remote().is_some()
    }

    /// The mode, or `None` while hydrating.
    #[must_use]
    pub fn mode(&self) -> Option<Mode> {
        self.phase().mode()
    }

    /// The current collection with its aggregates.
    #[must_use]
    pub fn snapshot(&self) -> Collection<K> {
        self.state.borrow().clone()
    }

    /// Receiver notified after every change to the collection.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Collection<K>> {
        self.state.subscribe()
    }

    /// Receiver notified on every phase transition.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Receiver of the number of operations in flight.
    #[must_use]
    pub fn subscribe_busy(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    fn hydrate_local(&self) {
        self.phase.send_replace(Phase::LoadingLocal);
        let items = self.load_local();
        self.state.send_replace(Collection::load(items));
        self.phase.send_replace(Phase::Ready(Mode::Anonymous));
    }

    async fn hydrate_remote(&self, remote: &Arc<R>) {
        self.phase.send_replace(Phase::LoadingRemote);

        let local_items = self.load_local();
        let mut journal = self.local.journal().unwrap_or_else(|e| {
            tracing::warn!(collection = K::NAME, error = %e, "Ignoring unreadable migration journal");
            None
        });
        if local_items.is_empty() && journal.take().is_some() {
            tracing::debug!(collection = K::NAME, "Discarding stale migration journal");
            if let Err(e) = self.local.discard_journal() {
                tracing::warn!(collection = K::NAME, error = %e, "Failed to discard migration journal");
            }
        }

        let remote_items = match remote.fetch().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    collection = K::NAME,
                    error = %e,
                    "Failed to fetch remote collection; showing local items"
                );
                self.commit(remote, Collection::load(local_items), Mode::Unmigrated);
                return;
            }
        };

        if !should_migrate(&local_items, &remote_items, journal.as_ref()) {
            self.commit(remote, Collection::load(remote_items), Mode::Authenticated);
            return;
        }

        if !self.is_current(remote) {
            tracing::debug!(collection = K::NAME, "Session changed before migration; skipping it");
            return;
        }

        self.phase.send_replace(Phase::Migrating);
        let coordinator = SyncCoordinator::new(remote.as_ref(), &self.local);
        match coordinator.migrate(&local_items, journal).await {
            Ok(canonical) => {
                self.commit(remote, Collection::load(canonical), Mode::Authenticated);
            }
            Err(e) => {
                error::capture_migration_failure(K::NAME, &e);
                // A failed refetch comes after the purge: every item is in the
                // account, so the replayed items stay on screen from memory
                // and the next mutation's response replaces them
                let mode = if matches!(e, MigrationError::Refetch(_)) {
                    Mode::Authenticated
                } else {
                    Mode::Unmigrated
                };
                self.commit(remote, Collection::load(local_items), mode);
            }
        }
    }

    /// Publish a hydration result unless the session changed meanwhile.
    fn commit(&self, remote: &Arc<R>, collection: Collection<K>, mode: Mode) {
        if !self.is_current(remote) {
            tracing::debug!(collection = K::NAME, "Session changed during hydration; dropping result");
            return;
        }
        self.state.send_replace(collection);
        self.phase.send_replace(Phase::Ready(mode));
    }

    fn load_local(&self) -> Vec<K::Item> {
        self.local.load().unwrap_or_else(|e| {
            tracing::warn!(collection = K::NAME, error = %e, "Failed to read local collection");
            Vec::new()
        })
    }

    // =========================================================================
    // Mutation routing
    // =========================================================================

    async fn dispatch(&self, mutation: Mutation<K>) -> Result<()> {
        let _busy = BusyGuard::enter(&self.in_flight);
        let key = match &mutation {
            Mutation::Add(spec) => Some(K::spec_identity(spec).to_string()),
            Mutation::Remove(key) | Mutation::SetQuantity(key, _) => Some(key.to_string()),
            Mutation::Load(_) | Mutation::Clear => None,
        };
        let data: Vec<(&str, &str)> = key.as_deref().map(|k| ("key", k)).into_iter().collect();
        error::add_breadcrumb(K::NAME, mutation.label(), Some(&data));

        let mut retried = false;
        loop {
            self.wait_until_ready().await;

            match (self.current_remote(), self.mode()) {
                (Some(remote), Some(Mode::Authenticated)) => {
                    return self.apply_remote(&remote, mutation).await;
                }
                (Some(remote), Some(Mode::Unmigrated)) if !retried => {
                    retried = true;
                    self.hydrate_remote(&remote).await;
                }
                _ => {
                    self.apply_local(&mutation, true);
                    return Ok(());
                }
            }
        }
    }

    /// Wait until no hydration is in flight.
    async fn wait_until_ready(&self) {
        let mut phase = self.phase.subscribe();
        let ready = phase.wait_for(|current| current.mode().is_some()).await.is_ok();
        // The sender lives in `self`
        debug_assert!(ready, "phase channel closed");
    }

    async fn apply_remote(&self, remote: &Arc<R>, mutation: Mutation<K>) -> Result<()> {
        match call_remote(remote.as_ref(), &mutation).await {
            Ok(items) => {
                if self.is_current(remote) {
                    self.state.send_replace(Collection::load(items));
                }
                Ok(())
            }
            Err(e) => match StoreError::from_remote(&e) {
                Some(store_error) => {
                    tracing::warn!(
                        collection = K::NAME,
                        mutation = mutation.label(),
                        error = %e,
                        "Remote refused mutation"
                    );
                    Err(store_error)
                }
                None => {
                    tracing::warn!(
                        collection = K::NAME,
                        mutation = mutation.label(),
                        error = %e,
                        "Remote unavailable; applying mutation locally"
                    );
                    if self.is_current(remote) {
                        self.apply_local(&mutation, false);
                    }
                    Ok(())
                }
            },
        }
    }

    /// Run the reducer on the live state, optionally writing the result
    /// through to the local slot.
    fn apply_local(&self, mutation: &Mutation<K>, persist: bool) {
        let now = Utc::now();
        let changed = self
            .state
            .send_if_modified(|current| match current.apply(mutation, now) {
                Ok(next) if next == *current => false,
                Ok(next) => {
                    *current = next;
                    true
                }
                Err(ReduceError::AlreadyPresent(key)) => {
                    tracing::debug!(collection = K::NAME, %key, "Already present");
                    false
                }
            });

        if changed && persist {
            let items = self.items();
            if let Err(e) = self.local.save(&items) {
                tracing::warn!(
                    collection = K::NAME,
                    error = %e,
                    "Failed to persist local collection; keeping it in memory"
                );
            }
        }
    }

    // =========================================================================
    // Session slot
    // =========================================================================

    fn current_remote(&self) -> Option<Arc<R>> {
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_remote(&self, remote: Option<Arc<R>>) {
        *self.remote.lock().unwrap_or_else(PoisonError::into_inner) = remote;
    }

    fn is_current(&self, remote: &Arc<R>) -> bool {
        self.current_remote()
            .is_some_and(|current| Arc::ptr_eq(&current, remote))
    }
}

async fn call_remote<K, R>(
    remote: &R,
    mutation: &Mutation<K>,
) -> std::result::Result<Vec<K::Item>, RemoteError>
where
    K: CollectionKind,
    R: RemoteCollection<K>,
{
    match mutation {
        Mutation::Add(spec) => remote.add(spec).await,
        Mutation::Remove(key) => remote.remove(key).await,
        Mutation::SetQuantity(key, quantity) => remote.set_quantity(key, *quantity).await,
        Mutation::Clear => remote.clear().await,
        // Hydration replaces the list directly and never reaches the remote
        Mutation::Load(items) => Ok(items.clone()),
    }
}
