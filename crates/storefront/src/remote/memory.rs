//! In-process implementation of the remote collection contract.
//!
//! Applies the server-side semantics with the same reducer the client uses,
//! plus the things a real server does that a client cannot predict: refusing
//! a product, clamping a quantity, or being unreachable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use satchel_core::{Collection, CollectionKind, IdentityKey, ItemSpec, Mutation, ProductId};

use super::{RemoteCollection, RemoteError};

/// A call received by a [`MemoryRemote`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch,
    Add(IdentityKey),
    SetQuantity(IdentityKey, i64),
    Remove(IdentityKey),
    Clear,
}

impl RemoteCall {
    /// Whether the call mutates the collection.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::Fetch)
    }
}

/// Server-side collection held in memory.
///
/// Clones share state, so a test can keep a handle for inspection while the
/// store under test owns another.
pub struct MemoryRemote<K: CollectionKind> {
    inner: Arc<Mutex<RemoteState<K>>>,
}

struct RemoteState<K: CollectionKind> {
    collection: Collection<K>,
    calls: Vec<RemoteCall>,
    offline: bool,
    writes_before_failure: Option<usize>,
    reads_before_failure: Option<usize>,
    yields_per_call: usize,
    rejected: HashMap<ProductId, String>,
    max_quantity: Option<u32>,
}

impl<K: CollectionKind> Clone for MemoryRemote<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: CollectionKind> Default for MemoryRemote<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CollectionKind> std::fmt::Debug for MemoryRemote<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryRemote")
            .field("collection", &K::NAME)
            .field("items", &state.collection.len())
            .field("offline", &state.offline)
            .finish_non_exhaustive()
    }
}

impl<K: CollectionKind> MemoryRemote<K> {
    /// An empty remote collection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// A remote collection that already holds `items`.
    #[must_use]
    pub fn with_items(items: Vec<K::Item>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RemoteState {
                collection: Collection::load(items),
                calls: Vec::new(),
                offline: false,
                writes_before_failure: None,
                reads_before_failure: None,
                yields_per_call: 0,
                rejected: HashMap::new(),
                max_quantity: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, RemoteState<K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current server-side items.
    #[must_use]
    pub fn items(&self) -> Vec<K::Item> {
        self.state().collection.items().to_vec()
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    /// Number of mutating calls received so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.is_write()).count()
    }

    /// Fail every call as unreachable while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Let `writes` more mutating calls succeed, then fail the rest as
    /// unreachable until [`Self::restore`] is called.
    pub fn fail_writes_after(&self, writes: usize) {
        self.state().writes_before_failure = Some(writes);
    }

    /// Let `reads` more fetches succeed, then fail the rest as unreachable
    /// until [`Self::restore`] is called.
    pub fn fail_fetches_after(&self, reads: usize) {
        self.state().reads_before_failure = Some(reads);
    }

    /// Clear injected failures.
    pub fn restore(&self) {
        let mut state = self.state();
        state.offline = false;
        state.writes_before_failure = None;
        state.reads_before_failure = None;
    }

    /// Yield to the scheduler `yields` times before answering each call, so
    /// other tasks can run while a call is outstanding.
    pub fn delay_calls(&self, yields: usize) {
        self.state().yields_per_call = yields;
    }

    async fn pause(&self) {
        let yields = self.state().yields_per_call;
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
    }

    /// Refuse adds of `product_id` with a validation message.
    pub fn reject_product(&self, product_id: ProductId, reason: impl Into<String>) {
        self.state().rejected.insert(product_id, reason.into());
    }

    /// Clamp every line to at most `max` units (server-side stock limit).
    pub fn set_max_quantity(&self, max: u32) {
        self.state().max_quantity = Some(max);
    }

    fn call(
        &self,
        call: RemoteCall,
        mutation: Option<Mutation<K>>,
    ) -> Result<Vec<K::Item>, RemoteError> {
        let mut state = self.state();
        let is_write = call.is_write();
        state.calls.push(call);

        if state.offline {
            return Err(RemoteError::Unavailable("remote offline".to_string()));
        }

        let budget = if is_write {
            &mut state.writes_before_failure
        } else {
            &mut state.reads_before_failure
        };
        match *budget {
            Some(0) => {
                return Err(RemoteError::Unavailable("injected failure".to_string()));
            }
            Some(n) => *budget = Some(n - 1),
            None => {}
        }

        if let Some(Mutation::Add(spec)) = &mutation
            && let Some(reason) = state.rejected.get(&spec.product_id)
        {
            return Err(RemoteError::Rejected(reason.clone()));
        }

        if let Some(mutation) = mutation {
            // A repeated wishlist add is a no-op on the server
            if let Ok(next) = state.collection.apply(&mutation, Utc::now()) {
                state.collection = next;
            }
            if let Some(max) = state.max_quantity {
                let clamped = clamp(&state.collection, max);
                state.collection = clamped;
            }
        }

        Ok(state.collection.items().to_vec())
    }
}

fn clamp<K: CollectionKind>(collection: &Collection<K>, max: u32) -> Collection<K> {
    let over: Vec<IdentityKey> = collection
        .items()
        .iter()
        .filter(|item| K::quantity(item) > max)
        .map(K::identity)
        .collect();

    over.into_iter().fold(collection.clone(), |acc, key| {
        acc.apply(&Mutation::SetQuantity(key, i64::from(max)), Utc::now())
            .unwrap_or(acc)
    })
}

impl<K: CollectionKind> RemoteCollection<K> for MemoryRemote<K> {
    async fn fetch(&self) -> Result<Vec<K::Item>, RemoteError> {
        self.pause().await;
        self.call(RemoteCall::Fetch, None)
    }

    async fn add(&self, spec: &ItemSpec) -> Result<Vec<K::Item>, RemoteError> {
        self.pause().await;
        self.call(
            RemoteCall::Add(K::spec_identity(spec)),
            Some(Mutation::Add(spec.clone())),
        )
    }

    async fn set_quantity(
        &self,
        key: &IdentityKey,
        quantity: i64,
    ) -> Result<Vec<K::Item>, RemoteError> {
        self.pause().await;
        self.call(
            RemoteCall::SetQuantity(key.clone(), quantity),
            Some(Mutation::SetQuantity(key.clone(), quantity)),
        )
    }

    async fn remove(&self, key: &IdentityKey) -> Result<Vec<K::Item>, RemoteError> {
        self.pause().await;
        self.call(
            RemoteCall::Remove(key.clone()),
            Some(Mutation::Remove(key.clone())),
        )
    }

    async fn clear(&self) -> Result<Vec<K::Item>, RemoteError> {
        self.pause().await;
        self.call(RemoteCall::Clear, Some(Mutation::Clear))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use satchel_core::{Cart, Wishlist};

    fn spec(id: &str) -> ItemSpec {
        ItemSpec::new(ProductId::parse(id).unwrap(), "Resin", Decimal::from(1359), "x")
    }

    #[tokio::test]
    async fn test_add_increments_existing() {
        let remote = MemoryRemote::<Cart>::new();
        remote.add(&spec("p1")).await.unwrap();
        let items = remote.add(&spec("p1")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_wishlist_duplicate_add_is_noop() {
        let remote = MemoryRemote::<Wishlist>::new();
        remote.add(&spec("p1")).await.unwrap();
        let items = remote.add(&spec("p1")).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_set_quantity_zero_removes() {
        let remote = MemoryRemote::<Cart>::new();
        remote.add(&spec("p1")).await.unwrap();
        let items = remote.set_quantity(&spec("p1").identity(), 0).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_fail_writes_after() {
        let remote = MemoryRemote::<Cart>::new();
        remote.fail_writes_after(1);

        assert!(remote.add(&spec("p1")).await.is_ok());
        let err = remote.add(&spec("p2")).await.unwrap_err();
        assert!(err.is_transient());
        // Reads still work
        assert_eq!(remote.fetch().await.unwrap().len(), 1);

        remote.restore();
        assert_eq!(remote.add(&spec("p2")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_fetches_after() {
        let remote = MemoryRemote::<Cart>::new();
        remote.fail_fetches_after(1);

        assert!(remote.fetch().await.is_ok());
        assert!(remote.fetch().await.unwrap_err().is_transient());
        // Writes still work
        assert_eq!(remote.add(&spec("p1")).await.unwrap().len(), 1);

        remote.restore();
        assert_eq!(remote.fetch().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_product() {
        let remote = MemoryRemote::<Cart>::new();
        remote.reject_product(ProductId::parse("p1").unwrap(), "out of stock");
        let err = remote.add(&spec("p1")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(ref m) if m == "out of stock"));
        assert!(remote.items().is_empty());
    }

    #[tokio::test]
    async fn test_max_quantity_clamps() {
        let remote = MemoryRemote::<Cart>::new();
        remote.set_max_quantity(2);
        remote.add(&spec("p1")).await.unwrap();
        let items = remote.set_quantity(&spec("p1").identity(), 9).await.unwrap();
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let remote = MemoryRemote::<Cart>::new();
        remote.fetch().await.unwrap();
        remote.add(&spec("p1")).await.unwrap();
        remote.clear().await.unwrap();

        assert_eq!(
            remote.calls(),
            vec![
                RemoteCall::Fetch,
                RemoteCall::Add(spec("p1").identity()),
                RemoteCall::Clear
            ]
        );
        assert_eq!(remote.write_count(), 2);
    }
}
