//! Remote Store adapter.
//!
//! # Architecture
//!
//! - The remote collection is server-authoritative and reachable only with
//!   an authenticated customer
//! - Every operation returns the **full** post-mutation collection, never a
//!   delta, so callers always resynchronize instead of trusting a prediction
//! - No caching: collections are mutable per-customer state
//!
//! # Implementations
//!
//! - [`HttpRemote`] - REST client for the storefront collection API
//! - [`MemoryRemote`] - in-process implementation of the server contract

mod http;
mod memory;

pub use http::{HttpRemote, RemoteClient};
pub use memory::{MemoryRemote, RemoteCall};

use std::future::Future;

use satchel_core::{CollectionKind, IdentityKey, ItemSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the remote collection API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the contract.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The API is unreachable or failing (5xx).
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The API refused the request (e.g. out of stock, invalid input).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The customer token is missing, expired or revoked.
    #[error("Unauthorized")]
    Unauthorized,
}

impl RemoteError {
    /// Whether the failure says nothing about the request itself.
    ///
    /// Transient failures may be papered over by applying the mutation
    /// locally; rejections and auth failures must be surfaced.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Parse(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }
}

/// Response body shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: serde::de::DeserializeOwned"))]
pub struct CollectionResponse<T> {
    pub items: Vec<T>,
}

/// Body of the `setQuantity` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityRequest {
    #[serde(flatten)]
    pub key: IdentityKey,
    pub quantity: i64,
}

/// The server-authoritative collection of one customer.
///
/// Implementations must honor the server-side contract: `add` increments an
/// existing identity or inserts it with quantity 1, `set_quantity` with a
/// quantity of zero or below removes, and every call answers with the
/// canonical post-mutation list.
pub trait RemoteCollection<K: CollectionKind>: Send + Sync {
    /// Current canonical collection.
    fn fetch(&self) -> impl Future<Output = Result<Vec<K::Item>, RemoteError>> + Send;

    /// Add one unit (or mark present).
    fn add(&self, spec: &ItemSpec)
    -> impl Future<Output = Result<Vec<K::Item>, RemoteError>> + Send;

    /// Set or remove.
    fn set_quantity(
        &self,
        key: &IdentityKey,
        quantity: i64,
    ) -> impl Future<Output = Result<Vec<K::Item>, RemoteError>> + Send;

    /// Remove one identity.
    fn remove(
        &self,
        key: &IdentityKey,
    ) -> impl Future<Output = Result<Vec<K::Item>, RemoteError>> + Send;

    /// Empty the collection.
    fn clear(&self) -> impl Future<Output = Result<Vec<K::Item>, RemoteError>> + Send;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use satchel_core::ProductId;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::RateLimited(3).is_transient());
        assert!(RemoteError::Unavailable("HTTP 503".to_string()).is_transient());
        assert!(!RemoteError::Rejected("out of stock".to_string()).is_transient());
        assert!(!RemoteError::Unauthorized.is_transient());
    }

    #[test]
    fn test_set_quantity_body_is_flat() {
        let body = SetQuantityRequest {
            key: IdentityKey::variant(ProductId::parse("p1").unwrap(), "L"),
            quantity: 0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "productId": "p1", "variant": "L", "quantity": 0 })
        );
    }

    fn parse_items<T: serde::de::DeserializeOwned>(body: &str) -> Vec<T> {
        serde_json::from_str::<CollectionResponse<T>>(body)
            .unwrap()
            .items
    }

    #[test]
    fn test_response_needs_only_deserialize_to_parse() {
        assert_eq!(parse_items::<u32>(r#"{ "items": [1, 2] }"#), vec![1, 2]);
        assert!(parse_items::<u32>(r#"{ "items": [] }"#).is_empty());
    }
}
