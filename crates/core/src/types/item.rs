//! Collection items as they are persisted locally and exchanged with the
//! remote collection API.
//!
//! Display fields (name, price, image) are denormalized copies captured when
//! the item was added. Nothing here re-validates them against a catalog.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{IdentityKey, ProductId};

/// What the UI hands over when adding something to a collection.
///
/// Also the body of the remote `add` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSpec {
    /// Catalog product.
    pub product_id: ProductId,
    /// Optional variant label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Product name at add-time.
    pub name: String,
    /// Unit price at add-time.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Image reference (URL or asset key).
    pub image: String,
}

impl ItemSpec {
    /// Create a spec for a product without a variant.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        price: Decimal,
        image: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            variant: None,
            name: name.into(),
            price,
            image: image.into(),
        }
    }

    /// Set the variant label.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// The identity key this spec would occupy.
    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            product_id: self.product_id.clone(),
            variant: self.variant.clone(),
        }
    }
}

/// A cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image: String,
    /// Always at least 1 once the item is part of a collection.
    pub quantity: u32,
}

impl CartItem {
    /// A new line with quantity 1.
    #[must_use]
    pub fn from_spec(spec: &ItemSpec) -> Self {
        Self {
            product_id: spec.product_id.clone(),
            variant: spec.variant.clone(),
            name: spec.name.clone(),
            price: spec.price,
            image: spec.image.clone(),
            quantity: 1,
        }
    }

    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            product_id: self.product_id.clone(),
            variant: self.variant.clone(),
        }
    }

    /// The add request that recreates this line (at quantity 1).
    #[must_use]
    pub fn spec(&self) -> ItemSpec {
        ItemSpec {
            product_id: self.product_id.clone(),
            variant: self.variant.clone(),
            name: self.name.clone(),
            price: self.price,
            image: self.image.clone(),
        }
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A wishlist entry. Presence is binary, so there is no quantity and no
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub product_id: ProductId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image: String,
    /// When the entry was added. Informational only.
    pub added_at: DateTime<Utc>,
}

impl WishlistItem {
    /// A new entry stamped with `now`. Any variant on the spec is dropped.
    #[must_use]
    pub fn from_spec(spec: &ItemSpec, now: DateTime<Utc>) -> Self {
        Self {
            product_id: spec.product_id.clone(),
            name: spec.name.clone(),
            price: spec.price,
            image: spec.image.clone(),
            added_at: now,
        }
    }

    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::product(self.product_id.clone())
    }

    #[must_use]
    pub fn spec(&self) -> ItemSpec {
        ItemSpec::new(
            self.product_id.clone(),
            self.name.clone(),
            self.price,
            self.image.clone(),
        )
    }
}
