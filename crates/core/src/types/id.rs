//! Product identifiers and collection identity keys.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ProductId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductIdError {
    /// The input string is empty.
    #[error("product id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("product id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains whitespace.
    #[error("product id cannot contain whitespace")]
    Whitespace,
}

/// A catalog product identifier.
///
/// The collection store never interprets the value; it only compares ids
/// when deciding whether two items are the same row.
///
/// ## Constraints
///
/// - Length: 1-255 characters
/// - No whitespace
///
/// ## Examples
///
/// ```
/// use satchel_core::ProductId;
///
/// assert!(ProductId::parse("p1").is_ok());
/// assert!(ProductId::parse("gid://shop/Product/42").is_ok());
///
/// assert!(ProductId::parse("").is_err());
/// assert!(ProductId::parse("two words").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Maximum length of a product id.
    pub const MAX_LENGTH: usize = 255;

    /// Parse a `ProductId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 255 characters,
    /// or contains whitespace.
    pub fn parse(s: &str) -> Result<Self, ProductIdError> {
        if s.is_empty() {
            return Err(ProductIdError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(ProductIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(char::is_whitespace) {
            return Err(ProductIdError::Whitespace);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ProductId` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProductId {
    type Err = ProductIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProductId {
    type Error = ProductIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The `(productId, variant)` pair that decides whether two items are the
/// same row of a collection.
///
/// Serialized as `{ "productId": ..., "variant": ... }` with `variant`
/// omitted when absent, matching the remote filter shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct IdentityKey {
    /// Catalog product.
    pub product_id: ProductId,
    /// Optional variant label (size, color, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl IdentityKey {
    /// Key for a product without a variant.
    #[must_use]
    pub const fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant: None,
        }
    }

    /// Key for a specific variant of a product.
    #[must_use]
    pub fn variant(product_id: ProductId, variant: impl Into<String>) -> Self {
        Self {
            product_id,
            variant: Some(variant.into()),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{variant}", self.product_id),
            None => write!(f, "{}", self.product_id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_ids() {
        assert!(ProductId::parse("p1").is_ok());
        assert!(ProductId::parse("resin-tray-xl").is_ok());
        assert!(ProductId::parse("gid://shop/Product/42").is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ProductId::parse(""), Err(ProductIdError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(256);
        assert!(matches!(
            ProductId::parse(&long),
            Err(ProductIdError::TooLong { max: 255 })
        ));
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(
            ProductId::parse("p 1"),
            Err(ProductIdError::Whitespace)
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ProductId = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(ok.as_str(), "p1");
        assert!(serde_json::from_str::<ProductId>("\"\"").is_err());
    }

    #[test]
    fn test_identity_key_display() {
        let id = ProductId::parse("p1").unwrap();
        assert_eq!(IdentityKey::product(id.clone()).to_string(), "p1");
        assert_eq!(IdentityKey::variant(id, "Large").to_string(), "p1/Large");
    }

    #[test]
    fn test_identity_key_omits_missing_variant() {
        let key = IdentityKey::product(ProductId::parse("p1").unwrap());
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"productId":"p1"}"#);
    }

    #[test]
    fn test_variant_distinguishes_keys() {
        let id = ProductId::parse("p1").unwrap();
        assert_ne!(
            IdentityKey::product(id.clone()),
            IdentityKey::variant(id, "Large")
        );
    }
}
