//! REST client for the storefront collection API.
//!
//! Uses `reqwest` for HTTP. Paths are joined onto the configured base URL:
//!
//! | Operation | Request |
//! |---|---|
//! | fetch | `GET {base}/{collection}` |
//! | add | `POST {base}/{collection}/items` |
//! | set quantity | `PATCH {base}/{collection}/items` |
//! | remove | `DELETE {base}/{collection}/items?productId=..&variant=..` |
//! | clear | `DELETE {base}/{collection}` |

use std::marker::PhantomData;
use std::sync::Arc;

use reqwest::StatusCode;
use satchel_core::{CollectionKind, IdentityKey, ItemSpec};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use super::{CollectionResponse, RemoteCollection, RemoteError, SetQuantityRequest};
use crate::config::RemoteApiConfig;

/// Header carrying the storefront access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-storefront-access-token";

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error body the API may send with a 4xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// RemoteClient
// =============================================================================

/// Authenticated connection to the collection API, shared by the cart and
/// wishlist adapters of one customer session.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    http: reqwest::Client,
    base_url: Url,
    access_token: SecretString,
    customer_token: SecretString,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("customer_token", &"[REDACTED]")
            .finish()
    }
}

impl RemoteClient {
    /// Create a client for one authenticated customer.
    #[must_use]
    pub fn new(config: &RemoteApiConfig, customer_token: SecretString) -> Self {
        Self::with_http_client(reqwest::Client::new(), config, customer_token)
    }

    /// Create a client reusing an existing connection pool.
    #[must_use]
    pub fn with_http_client(
        http: reqwest::Client,
        config: &RemoteApiConfig,
        customer_token: SecretString,
    ) -> Self {
        Self {
            inner: Arc::new(RemoteClientInner {
                http,
                base_url: config.base_url.clone(),
                access_token: config.access_token.clone(),
                customer_token,
            }),
        }
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| RemoteError::Rejected(format!("invalid URL for {path}: {e}")))
    }

    /// Send a request and decode the `{ items }` body.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, RemoteError> {
        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let response = request
            .bearer_auth(self.inner.customer_token.expose_secret())
            .header(ACCESS_TOKEN_HEADER, self.inner.access_token.expose_secret())
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized);
        }

        if status.is_client_error() {
            let message = serde_json::from_str::<ErrorBody>(&response_text).map_or_else(
                |_| rejection_text(status, &response_text),
                |body| body.error,
            );
            tracing::debug!(status = %status, %message, "Collection API rejected request");
            return Err(RemoteError::Rejected(message));
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Collection API returned non-success status"
            );
            return Err(RemoteError::Unavailable(format!(
                "HTTP {status}: {}",
                response_text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: CollectionResponse<T> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse collection API response"
                );
                return Err(RemoteError::Parse(e));
            }
        };

        Ok(parsed.items)
    }
}

fn rejection_text(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string()
    } else {
        body.chars().take(200).collect()
    }
}

// =============================================================================
// HttpRemote
// =============================================================================

/// [`RemoteCollection`] over HTTP for collection flavor `K`.
pub struct HttpRemote<K> {
    client: RemoteClient,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for HttpRemote<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: CollectionKind> std::fmt::Debug for HttpRemote<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("collection", &K::NAME)
            .field("client", &self.client)
            .finish()
    }
}

impl<K: CollectionKind> HttpRemote<K> {
    #[must_use]
    pub const fn new(client: RemoteClient) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn collection_url(&self) -> Result<Url, RemoteError> {
        self.client.url(K::NAME)
    }

    fn items_url(&self) -> Result<Url, RemoteError> {
        self.client.url(&format!("{}/items", K::NAME))
    }

    fn http(&self) -> &reqwest::Client {
        &self.client.inner.http
    }
}

impl<K: CollectionKind> RemoteCollection<K> for HttpRemote<K> {
    #[instrument(skip(self), fields(collection = K::NAME, request_id))]
    async fn fetch(&self) -> Result<Vec<K::Item>, RemoteError> {
        let url = self.collection_url()?;
        self.client.send(self.http().get(url)).await
    }

    #[instrument(skip(self, spec), fields(collection = K::NAME, key = %K::spec_identity(spec), request_id))]
    async fn add(&self, spec: &ItemSpec) -> Result<Vec<K::Item>, RemoteError> {
        let url = self.items_url()?;
        self.client.send(self.http().post(url).json(spec)).await
    }

    #[instrument(skip(self), fields(collection = K::NAME, %key, request_id))]
    async fn set_quantity(
        &self,
        key: &IdentityKey,
        quantity: i64,
    ) -> Result<Vec<K::Item>, RemoteError> {
        let url = self.items_url()?;
        let body = SetQuantityRequest {
            key: key.clone(),
            quantity,
        };
        self.client.send(self.http().patch(url).json(&body)).await
    }

    #[instrument(skip(self), fields(collection = K::NAME, %key, request_id))]
    async fn remove(&self, key: &IdentityKey) -> Result<Vec<K::Item>, RemoteError> {
        let mut url = self.items_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("productId", key.product_id.as_str());
            if let Some(variant) = &key.variant {
                query.append_pair("variant", variant);
            }
        }
        self.client.send(self.http().delete(url)).await
    }

    #[instrument(skip(self), fields(collection = K::NAME, request_id))]
    async fn clear(&self) -> Result<Vec<K::Item>, RemoteError> {
        let url = self.collection_url()?;
        self.client.send(self.http().delete(url)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;
    use satchel_core::{Cart, Wishlist};

    fn client() -> RemoteClient {
        let config = RemoteApiConfig {
            base_url: parse_base_url("http://127.0.0.1:9/api").unwrap(),
            access_token: SecretString::from("storefront-token"),
        };
        RemoteClient::new(&config, SecretString::from("customer-token"))
    }

    #[test]
    fn test_urls_nest_under_base() {
        let cart = HttpRemote::<Cart>::new(client());
        assert_eq!(
            cart.collection_url().unwrap().as_str(),
            "http://127.0.0.1:9/api/cart"
        );
        assert_eq!(
            cart.items_url().unwrap().as_str(),
            "http://127.0.0.1:9/api/cart/items"
        );

        let wishlist = HttpRemote::<Wishlist>::new(client());
        assert_eq!(
            wishlist.collection_url().unwrap().as_str(),
            "http://127.0.0.1:9/api/wishlist"
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug_output = format!("{:?}", HttpRemote::<Cart>::new(client()));
        assert!(debug_output.contains("cart"));
        assert!(!debug_output.contains("customer-token"));
        assert!(!debug_output.contains("storefront-token"));
    }

    #[test]
    fn test_rejection_text_falls_back_to_reason() {
        assert_eq!(
            rejection_text(StatusCode::UNPROCESSABLE_ENTITY, "  "),
            "Unprocessable Entity"
        );
        assert_eq!(
            rejection_text(StatusCode::CONFLICT, "out of stock"),
            "out of stock"
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transient() {
        let cart = HttpRemote::<Cart>::new(client());
        let err = cart.fetch().await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
