//! Errors surfaced to the UI layer, with Sentry integration.
//!
//! Collection mutations never fail because the network did: transient remote
//! failures fall back to the local reducer. What reaches the caller is a
//! [`StoreError`], reserved for failures the customer must act on.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::sync::MigrationError;

/// Error returned by a collection mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The server refused the change (out of stock, invalid input).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The customer token is missing, expired or revoked.
    #[error("Unauthorized: sign in again")]
    Unauthorized,
}

impl StoreError {
    /// Convert a non-transient remote failure.
    ///
    /// Returns `None` for transient failures, which callers handle by
    /// applying the mutation locally instead.
    #[must_use]
    pub fn from_remote(err: &RemoteError) -> Option<Self> {
        match err {
            RemoteError::Rejected(message) => Some(Self::Rejected(message.clone())),
            RemoteError::Unauthorized => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Report a failed login migration.
///
/// The local collection survives a failed migration, so this is the only
/// trace of it outside the logs.
pub fn capture_migration_failure(collection: &str, err: &MigrationError) {
    let event_id = sentry::with_scope(
        |scope| {
            scope.set_tag("collection", collection);
            scope.set_tag("migration.stage", err.stage());
        },
        || sentry::capture_error(err),
    );
    tracing::error!(
        collection,
        error = %err,
        sentry_event_id = %event_id,
        "Login migration failed; local collection retained"
    );
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "add", Some(&[("key", "p1/Large")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
