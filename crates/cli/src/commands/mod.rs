//! Command implementations.

pub mod collection;
pub mod session;
