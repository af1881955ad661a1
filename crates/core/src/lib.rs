//! Satchel Core - shared types and the collection reducer.
//!
//! This crate provides the pieces of the cart and wishlist store that do no
//! I/O. It is used by:
//! - `storefront` - local/remote adapters, sync coordinator, state container
//! - `cli` - command-line driver for the store
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no storage, no
//! HTTP clients, no clocks. Callers pass the current time into the reducer so
//! every transition is deterministic and testable.
//!
//! # Modules
//!
//! - [`types`] - Product ids, identity keys and item shapes
//! - [`collection`] - The reducer and its aggregates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod collection;
pub mod types;

pub use collection::{Cart, Collection, CollectionKind, Mutation, ReduceError, Wishlist};
pub use types::*;
