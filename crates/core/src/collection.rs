//! The collection reducer.
//!
//! A [`Collection`] is an immutable snapshot of a cart or wishlist. Every
//! [`Mutation`] produces a new snapshot through [`Collection::apply`], a pure
//! function of the current snapshot, the mutation and the supplied clock
//! reading. Aggregates are recomputed from the resulting item list on every
//! transition; they are never carried forward.
//!
//! The two collection flavors differ only in how repeated adds and
//! quantities behave, which is captured by [`CollectionKind`]:
//!
//! | | [`Cart`] | [`Wishlist`] |
//! |---|---|---|
//! | repeated add | quantity + 1 | rejected |
//! | `total` | sum of price x quantity | sum of price |
//! | `item_count` | sum of quantities | number of entries |

use core::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{CartItem, IdentityKey, ItemSpec, WishlistItem};

/// Errors returned by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    /// The wishlist already holds this product.
    #[error("{0} is already in the collection")]
    AlreadyPresent(IdentityKey),
}

/// Per-flavor behavior of a collection.
pub trait CollectionKind:
    fmt::Debug + Clone + Copy + PartialEq + Eq + Send + Sync + 'static
{
    /// Item type stored in this collection.
    type Item: fmt::Debug
        + Clone
        + PartialEq
        + Eq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Short name used for storage slots, remote paths and logs.
    const NAME: &'static str;

    /// Whether items carry a quantity.
    const QUANTIFIED: bool;

    /// Identity key of a stored item.
    fn identity(item: &Self::Item) -> IdentityKey;

    /// Identity key an add request would occupy.
    fn spec_identity(spec: &ItemSpec) -> IdentityKey;

    /// Quantity of an item (always 1 for presence-only collections).
    fn quantity(item: &Self::Item) -> u32;

    /// Unit price of an item.
    fn price(item: &Self::Item) -> Decimal;

    /// The add request that recreates an item.
    fn spec(item: &Self::Item) -> ItemSpec;

    /// Build a fresh item for a first add.
    fn create(spec: &ItemSpec, now: DateTime<Utc>) -> Self::Item;

    /// Apply a repeated add to an existing item.
    ///
    /// # Errors
    ///
    /// Presence-only collections return [`ReduceError::AlreadyPresent`].
    fn readd(item: &mut Self::Item) -> Result<(), ReduceError>;

    /// Replace the quantity of an item. `quantity` is at least 1.
    fn set_quantity(item: &mut Self::Item, quantity: u32);

    /// Fold a duplicate row found while loading into the first occurrence.
    fn coalesce(existing: &mut Self::Item, duplicate: Self::Item);
}

/// Shopping cart: quantities matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cart {}

/// Wishlist: presence only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wishlist {}

impl CollectionKind for Cart {
    type Item = CartItem;

    const NAME: &'static str = "cart";
    const QUANTIFIED: bool = true;

    fn identity(item: &CartItem) -> IdentityKey {
        item.identity()
    }

    fn spec_identity(spec: &ItemSpec) -> IdentityKey {
        spec.identity()
    }

    fn quantity(item: &CartItem) -> u32 {
        item.quantity
    }

    fn price(item: &CartItem) -> Decimal {
        item.price
    }

    fn spec(item: &CartItem) -> ItemSpec {
        item.spec()
    }

    fn create(spec: &ItemSpec, _now: DateTime<Utc>) -> CartItem {
        CartItem::from_spec(spec)
    }

    fn readd(item: &mut CartItem) -> Result<(), ReduceError> {
        item.quantity = item.quantity.saturating_add(1);
        Ok(())
    }

    fn set_quantity(item: &mut CartItem, quantity: u32) {
        item.quantity = quantity;
    }

    fn coalesce(existing: &mut CartItem, duplicate: CartItem) {
        existing.quantity = existing.quantity.saturating_add(duplicate.quantity);
    }
}

impl CollectionKind for Wishlist {
    type Item = WishlistItem;

    const NAME: &'static str = "wishlist";
    const QUANTIFIED: bool = false;

    fn identity(item: &WishlistItem) -> IdentityKey {
        item.identity()
    }

    fn spec_identity(spec: &ItemSpec) -> IdentityKey {
        IdentityKey::product(spec.product_id.clone())
    }

    fn quantity(_item: &WishlistItem) -> u32 {
        1
    }

    fn price(item: &WishlistItem) -> Decimal {
        item.price
    }

    fn spec(item: &WishlistItem) -> ItemSpec {
        item.spec()
    }

    fn create(spec: &ItemSpec, now: DateTime<Utc>) -> WishlistItem {
        WishlistItem::from_spec(spec, now)
    }

    fn readd(item: &mut WishlistItem) -> Result<(), ReduceError> {
        Err(ReduceError::AlreadyPresent(item.identity()))
    }

    fn set_quantity(_item: &mut WishlistItem, _quantity: u32) {}

    fn coalesce(_existing: &mut WishlistItem, _duplicate: WishlistItem) {}
}

/// A state transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<K: CollectionKind> {
    /// Add one unit of a product (or mark it present).
    Add(ItemSpec),
    /// Drop an item.
    Remove(IdentityKey),
    /// Set an item's quantity; zero or below removes it.
    SetQuantity(IdentityKey, i64),
    /// Replace the whole collection.
    Load(Vec<K::Item>),
    /// Empty the collection.
    Clear,
}

impl<K: CollectionKind> Mutation<K> {
    /// Short label for logs and breadcrumbs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Remove(_) => "remove",
            Self::SetQuantity(..) => "set_quantity",
            Self::Load(_) => "load",
            Self::Clear => "clear",
        }
    }
}

/// An immutable collection snapshot with its derived aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection<K: CollectionKind> {
    items: Vec<K::Item>,
    total: Decimal,
    item_count: u32,
}

impl<K: CollectionKind> Default for Collection<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: CollectionKind> Collection<K> {
    /// An empty collection with zero aggregates.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: Decimal::ZERO,
            item_count: 0,
        }
    }

    /// Build a snapshot from an arbitrary item list.
    ///
    /// The list is normalized first: rows with quantity 0 are dropped and
    /// rows sharing an identity key are coalesced into the first occurrence.
    #[must_use]
    pub fn load(items: Vec<K::Item>) -> Self {
        let mut normalized: Vec<K::Item> = Vec::with_capacity(items.len());

        for item in items {
            if K::quantity(&item) == 0 {
                continue;
            }
            let key = K::identity(&item);
            match normalized.iter_mut().find(|existing| K::identity(existing) == key) {
                Some(existing) => K::coalesce(existing, item),
                None => normalized.push(item),
            }
        }

        Self::recompute(normalized)
    }

    fn recompute(items: Vec<K::Item>) -> Self {
        let total = items
            .iter()
            .map(|item| K::price(item) * Decimal::from(K::quantity(item)))
            .sum();
        let item_count = items
            .iter()
            .fold(0u32, |count, item| count.saturating_add(K::quantity(item)));

        Self {
            items,
            total,
            item_count,
        }
    }

    /// Apply a mutation, returning the next snapshot.
    ///
    /// Removing or re-quantifying an absent key returns an equal snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::AlreadyPresent`] when a presence-only
    /// collection is asked to add an item it already holds.
    pub fn apply(&self, mutation: &Mutation<K>, now: DateTime<Utc>) -> Result<Self, ReduceError> {
        match mutation {
            Mutation::Add(spec) => {
                let key = K::spec_identity(spec);
                let mut items = self.items.clone();
                match items.iter_mut().find(|item| K::identity(item) == key) {
                    Some(existing) => K::readd(existing)?,
                    None => items.push(K::create(spec, now)),
                }
                Ok(Self::recompute(items))
            }
            Mutation::Remove(key) => Ok(self.without(key)),
            Mutation::SetQuantity(key, quantity) => {
                if *quantity <= 0 {
                    return Ok(self.without(key));
                }
                let quantity = u32::try_from(*quantity).unwrap_or(u32::MAX);
                let mut items = self.items.clone();
                if let Some(existing) = items.iter_mut().find(|item| K::identity(item) == *key) {
                    K::set_quantity(existing, quantity);
                }
                Ok(Self::recompute(items))
            }
            Mutation::Load(items) => Ok(Self::load(items.clone())),
            Mutation::Clear => Ok(Self::empty()),
        }
    }

    fn without(&self, key: &IdentityKey) -> Self {
        let items = self
            .items
            .iter()
            .filter(|item| K::identity(item) != *key)
            .cloned()
            .collect();
        Self::recompute(items)
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[K::Item] {
        &self.items
    }

    /// Consume the snapshot, returning its items.
    #[must_use]
    pub fn into_items(self) -> Vec<K::Item> {
        self.items
    }

    /// Look up an item by identity key.
    #[must_use]
    pub fn get(&self, key: &IdentityKey) -> Option<&K::Item> {
        self.items.iter().find(|item| K::identity(item) == *key)
    }

    /// Sum of price x quantity (sum of prices for a wishlist).
    #[must_use]
    pub const fn total(&self) -> Decimal {
        self.total
    }

    /// Sum of quantities (entry count for a wishlist).
    #[must_use]
    pub const fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Number of distinct rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
