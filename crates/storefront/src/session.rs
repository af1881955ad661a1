//! A storefront visitor's cart and wishlist.
//!
//! [`StorefrontSession`] mounts both collection stores over the same local
//! storage and switches them together when the visitor signs in or out.
//! Signed-in stores talk to the collection API through one shared
//! connection pool.

use satchel_core::{Cart, Wishlist};
use secrecy::SecretString;
use tracing::instrument;

use crate::config::RemoteApiConfig;
use crate::local::LocalStorage;
use crate::remote::{HttpRemote, RemoteClient};
use crate::store::{CollectionStore, Session};

/// Cart store backed by the HTTP collection API.
pub type CartStore<L> = CollectionStore<Cart, HttpRemote<Cart>, L>;

/// Wishlist store backed by the HTTP collection API.
pub type WishlistStore<L> = CollectionStore<Wishlist, HttpRemote<Wishlist>, L>;

/// Both collections of one visitor.
pub struct StorefrontSession<L> {
    api: RemoteApiConfig,
    http: reqwest::Client,
    cart: CartStore<L>,
    wishlist: WishlistStore<L>,
}

impl<L> std::fmt::Debug for StorefrontSession<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontSession")
            .field("api", &self.api)
            .field("cart", &self.cart)
            .field("wishlist", &self.wishlist)
            .finish_non_exhaustive()
    }
}

impl<L: LocalStorage + Clone> StorefrontSession<L> {
    /// Mount both stores, signed in when `customer_token` is present.
    pub async fn mount(
        api: RemoteApiConfig,
        storage: L,
        customer_token: Option<SecretString>,
    ) -> Self {
        let http = reqwest::Client::new();
        let (cart_session, wishlist_session) = match customer_token {
            Some(token) => {
                let client = RemoteClient::with_http_client(http.clone(), &api, token);
                (
                    Session::Authenticated(HttpRemote::new(client.clone())),
                    Session::Authenticated(HttpRemote::new(client)),
                )
            }
            None => (Session::Anonymous, Session::Anonymous),
        };

        let (cart, wishlist) = tokio::join!(
            CollectionStore::mount(storage.clone(), cart_session),
            CollectionStore::mount(storage, wishlist_session),
        );

        Self {
            api,
            http,
            cart,
            wishlist,
        }
    }

    /// Sign in, migrating any anonymous items into the account.
    #[instrument(skip_all)]
    pub async fn login(&self, customer_token: SecretString) {
        let client = RemoteClient::with_http_client(self.http.clone(), &self.api, customer_token);
        tokio::join!(
            self.cart
                .set_session(Session::Authenticated(HttpRemote::new(client.clone()))),
            self.wishlist
                .set_session(Session::Authenticated(HttpRemote::new(client))),
        );
        tracing::info!(
            cart_items = self.cart.count(),
            wishlist_items = self.wishlist.count(),
            "Customer signed in"
        );
    }

    /// Sign out. Both stores fall back to the local collections.
    #[instrument(skip_all)]
    pub async fn logout(&self) {
        tokio::join!(
            self.cart.set_session(Session::Anonymous),
            self.wishlist.set_session(Session::Anonymous),
        );
        tracing::info!("Customer signed out");
    }

    /// Whether the stores are bound to a customer account. True from the
    /// start of [`Self::login`], before hydration finishes.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.cart.is_signed_in()
    }

    pub const fn cart(&self) -> &CartStore<L> {
        &self.cart
    }

    pub const fn wishlist(&self) -> &WishlistStore<L> {
        &self.wishlist
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;
    use crate::store::Mode;
    use crate::local::MemoryStorage;
    use rust_decimal::Decimal;
    use satchel_core::{ItemSpec, ProductId};

    fn api() -> RemoteApiConfig {
        RemoteApiConfig {
            base_url: parse_base_url("http://127.0.0.1:9/").unwrap(),
            access_token: SecretString::from("storefront-token"),
        }
    }

    fn spec(id: &str) -> ItemSpec {
        ItemSpec::new(ProductId::parse(id).unwrap(), "Resin", Decimal::from(5), "x")
    }

    #[tokio::test]
    async fn test_anonymous_session_uses_local_slots() {
        let storage = MemoryStorage::new();
        let session = StorefrontSession::mount(api(), storage.clone(), None).await;
        assert!(!session.is_authenticated());

        session.cart().add_item(spec("p1")).await.unwrap();
        session.wishlist().add_item(spec("p2")).await.unwrap();

        assert!(storage.read("satchel.cart").unwrap().is_some());
        assert!(storage.read("satchel.wishlist").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_against_unreachable_api_keeps_local_items() {
        let storage = MemoryStorage::new();
        let session = StorefrontSession::mount(api(), storage, None).await;
        session.cart().add_item(spec("p1")).await.unwrap();

        session.login(SecretString::from("customer")).await;

        assert!(session.is_authenticated());
        assert_eq!(session.cart().mode(), Some(Mode::Unmigrated));
        assert_eq!(session.cart().count(), 1);

        session.logout().await;
        assert!(!session.is_authenticated());
        assert_eq!(session.cart().count(), 1);
    }
}
