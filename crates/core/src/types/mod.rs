//! Core types for Satchel.
//!
//! This module provides type-safe wrappers for product identity and the item
//! shapes stored in carts and wishlists.

pub mod id;
pub mod item;

pub use id::{IdentityKey, ProductId, ProductIdError};
pub use item::{CartItem, ItemSpec, WishlistItem};
