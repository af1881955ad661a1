//! Integration tests for the HTTP collection adapter.
//!
//! Each test starts its own [`MockRemoteServer`] on a loopback port.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use rust_decimal::Decimal;
use satchel_core::{Cart, IdentityKey, ItemSpec, ProductId, Wishlist};
use satchel_integration_tests::{ACCESS_TOKEN, MockRemoteServer};
use satchel_storefront::remote::{HttpRemote, RemoteCall, RemoteClient, RemoteCollection, RemoteError};
use secrecy::SecretString;

fn pid(id: &str) -> ProductId {
    ProductId::parse(id).unwrap()
}

fn resin() -> ItemSpec {
    ItemSpec::new(pid("p1"), "Maple Resin", Decimal::new(1359, 2), "resin.png")
}

fn client(server: &MockRemoteServer) -> RemoteClient {
    RemoteClient::new(&server.api_config(), MockRemoteServer::customer_token())
}

#[tokio::test]
async fn test_fetch_empty_collection() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let cart = HttpRemote::<Cart>::new(client(&server));

    assert!(cart.fetch().await.unwrap().is_empty());
    assert_eq!(server.cart.calls(), vec![RemoteCall::Fetch]);
}

#[tokio::test]
async fn test_add_twice_increments_and_keeps_price() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let cart = HttpRemote::<Cart>::new(client(&server));

    cart.add(&resin()).await.unwrap();
    let items = cart.add(&resin()).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].price, Decimal::new(1359, 2));
    assert_eq!(server.cart.items(), items);
}

#[tokio::test]
async fn test_variant_lines_are_addressed_separately() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let cart = HttpRemote::<Cart>::new(client(&server));

    cart.add(&resin().with_variant("Small")).await.unwrap();
    cart.add(&resin().with_variant("Large")).await.unwrap();

    let items = cart
        .set_quantity(&IdentityKey::variant(pid("p1"), "Large"), 4)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].quantity, 4);

    let items = cart
        .remove(&IdentityKey::variant(pid("p1"), "Small"))
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].variant.as_deref(), Some("Large"));
}

#[tokio::test]
async fn test_set_quantity_zero_removes_and_clear_empties() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let cart = HttpRemote::<Cart>::new(client(&server));

    cart.add(&resin()).await.unwrap();
    assert!(
        cart.set_quantity(&resin().identity(), 0)
            .await
            .unwrap()
            .is_empty()
    );

    cart.add(&resin()).await.unwrap();
    assert!(cart.clear().await.unwrap().is_empty());
    assert!(server.cart.items().is_empty());
}

#[tokio::test]
async fn test_wishlist_is_presence_only() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let wishlist = HttpRemote::<Wishlist>::new(client(&server));

    wishlist.add(&resin()).await.unwrap();
    let items = wishlist.add(&resin()).await.unwrap();

    assert_eq!(items.len(), 1);
    assert!(server.cart.items().is_empty());
}

#[tokio::test]
async fn test_rejection_carries_server_message() {
    let server = MockRemoteServer::spawn().await.unwrap();
    server.cart.reject_product(pid("p1"), "out of stock");
    let cart = HttpRemote::<Cart>::new(client(&server));

    let err = cart.add(&resin()).await.unwrap_err();

    assert!(matches!(err, RemoteError::Rejected(ref m) if m == "out of stock"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_wrong_customer_token_is_unauthorized() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let client = RemoteClient::new(&server.api_config(), SecretString::from("expired"));
    let cart = HttpRemote::<Cart>::new(client);

    let err = cart.fetch().await.unwrap_err();

    assert!(matches!(err, RemoteError::Unauthorized));
    assert!(server.cart.calls().is_empty());
}

#[tokio::test]
async fn test_server_failure_is_transient() {
    let server = MockRemoteServer::spawn().await.unwrap();
    server.cart.set_offline(true);
    let cart = HttpRemote::<Cart>::new(client(&server));

    let err = cart.fetch().await.unwrap_err();

    assert!(matches!(err, RemoteError::Unavailable(_)), "unexpected: {err}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_requests_carry_auth_headers() {
    let server = MockRemoteServer::spawn().await.unwrap();
    let url = format!("{}cart", server.base_url());
    let http = reqwest::Client::new();

    let anonymous = http.get(&url).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authorized = http
        .get(&url)
        .bearer_auth(satchel_integration_tests::CUSTOMER_TOKEN)
        .header("x-storefront-access-token", ACCESS_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(authorized.status(), StatusCode::OK);

    let body: serde_json::Value = authorized.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "items": [] }));
}
