//! Satchel storefront collections.
//!
//! Cart and wishlist state for a storefront visitor, anonymous or signed in:
//!
//! - [`local`] - synchronous slot persistence for anonymous visitors
//! - [`remote`] - the server-authoritative collection API
//! - [`sync`] - login migration of a local collection into the account
//! - [`store`] - the state container routing mutations between the two
//! - [`session`] - one visitor's cart and wishlist, switched together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod local;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;

pub use error::StoreError;
pub use session::StorefrontSession;
pub use store::{CollectionStore, Mode, Phase, Session};
