//! Integration tests for Satchel.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p satchel-integration-tests
//! ```
//!
//! The tests need no external services: [`MockRemoteServer`] serves the
//! collection API on a loopback port, backed by [`MemoryRemote`] so tests
//! can seed data, inject failures and inspect what the server received.
//!
//! # Test Categories
//!
//! - `http_remote` - the HTTP adapter against the wire contract
//! - `session_flow` - anonymous use, login migration and logout end to end

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use satchel_core::{Cart, CollectionKind, IdentityKey, ItemSpec, Wishlist};
use satchel_storefront::config::{RemoteApiConfig, parse_base_url};
use satchel_storefront::remote::{
    CollectionResponse, MemoryRemote, RemoteCollection, RemoteError, SetQuantityRequest,
};
use secrecy::SecretString;
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Storefront access token the mock server expects.
pub const ACCESS_TOKEN: &str = "storefront-Zq81xLr2";

/// Customer token the mock server accepts.
pub const CUSTOMER_TOKEN: &str = "customer-Hc47pWm9";

/// Path prefix the collection routes are served under.
pub const API_PREFIX: &str = "/api";

// =============================================================================
// Routes
// =============================================================================

struct CollectionState<K: CollectionKind> {
    remote: MemoryRemote<K>,
    access_token: Arc<str>,
    customer_token: Arc<str>,
}

impl<K: CollectionKind> Clone for CollectionState<K> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            access_token: Arc::clone(&self.access_token),
            customer_token: Arc::clone(&self.customer_token),
        }
    }
}

impl<K: CollectionKind> CollectionState<K> {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let access = headers
            .get("x-storefront-access-token")
            .and_then(|v| v.to_str().ok());

        bearer == Some(&*self.customer_token) && access == Some(&*self.access_token)
    }
}

/// Routes for one collection flavor, served at `/api/{name}`.
pub fn collection_routes<K: CollectionKind>(remote: MemoryRemote<K>) -> Router {
    let state = CollectionState {
        remote,
        access_token: Arc::from(ACCESS_TOKEN),
        customer_token: Arc::from(CUSTOMER_TOKEN),
    };

    Router::new()
        .route(
            &format!("{API_PREFIX}/{}", K::NAME),
            get(fetch::<K>).delete(clear::<K>),
        )
        .route(
            &format!("{API_PREFIX}/{}/items", K::NAME),
            post(add::<K>).patch(set_quantity::<K>).delete(remove::<K>),
        )
        .with_state(state)
}

async fn fetch<K: CollectionKind>(
    State(state): State<CollectionState<K>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    respond::<K>(state.remote.fetch().await)
}

async fn add<K: CollectionKind>(
    State(state): State<CollectionState<K>>,
    headers: HeaderMap,
    Json(spec): Json<ItemSpec>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    respond::<K>(state.remote.add(&spec).await)
}

async fn set_quantity<K: CollectionKind>(
    State(state): State<CollectionState<K>>,
    headers: HeaderMap,
    Json(body): Json<SetQuantityRequest>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    respond::<K>(state.remote.set_quantity(&body.key, body.quantity).await)
}

async fn remove<K: CollectionKind>(
    State(state): State<CollectionState<K>>,
    headers: HeaderMap,
    Query(key): Query<IdentityKey>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    respond::<K>(state.remote.remove(&key).await)
}

async fn clear<K: CollectionKind>(
    State(state): State<CollectionState<K>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    respond::<K>(state.remote.clear().await)
}

/// Map a server-side outcome onto the wire contract.
fn respond<K: CollectionKind>(result: Result<Vec<K::Item>, RemoteError>) -> Response {
    match result {
        Ok(items) => Json(CollectionResponse { items }).into_response(),
        Err(RemoteError::Rejected(message)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": message })),
        )
            .into_response(),
        Err(RemoteError::Unauthorized) => StatusCode::UNAUTHORIZED.into_response(),
        Err(RemoteError::RateLimited(seconds)) => {
            let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            response
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

// =============================================================================
// Server
// =============================================================================

/// The collection API served from memory on a loopback port.
#[derive(Debug)]
pub struct MockRemoteServer {
    pub addr: SocketAddr,
    /// Server-side cart of the [`CUSTOMER_TOKEN`] customer.
    pub cart: MemoryRemote<Cart>,
    /// Server-side wishlist of the [`CUSTOMER_TOKEN`] customer.
    pub wishlist: MemoryRemote<Wishlist>,
}

impl MockRemoteServer {
    /// Start a server with an empty cart and wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if no loopback port can be bound.
    pub async fn spawn() -> std::io::Result<Self> {
        Self::spawn_with(MemoryRemote::new(), MemoryRemote::new()).await
    }

    /// Start a server over existing server-side collections.
    ///
    /// # Errors
    ///
    /// Returns an error if no loopback port can be bound.
    pub async fn spawn_with(
        cart: MemoryRemote<Cart>,
        wishlist: MemoryRemote<Wishlist>,
    ) -> std::io::Result<Self> {
        let app = collection_routes(cart.clone())
            .merge(collection_routes(wishlist.clone()))
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Mock collection API stopped");
            }
        });

        Ok(Self {
            addr,
            cart,
            wishlist,
        })
    }

    /// Base URL of the collection API.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}{API_PREFIX}/", self.addr)
    }

    /// Client configuration pointing at this server.
    ///
    /// # Panics
    ///
    /// Never in practice: the loopback URL is always valid.
    #[must_use]
    pub fn api_config(&self) -> RemoteApiConfig {
        RemoteApiConfig {
            base_url: parse_base_url(&self.base_url())
                .unwrap_or_else(|e| panic!("invalid mock server URL: {e}")),
            access_token: SecretString::from(ACCESS_TOKEN),
        }
    }

    /// The token of the customer this server knows.
    #[must_use]
    pub fn customer_token() -> SecretString {
        SecretString::from(CUSTOMER_TOKEN)
    }
}
