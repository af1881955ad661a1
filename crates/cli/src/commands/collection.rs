//! Cart and wishlist commands.
//!
//! # Usage
//!
//! ```bash
//! satchel cart add --product p1 --name "Maple Resin" --price 13.59 --variant Large
//! satchel cart set --product p1 --variant Large --quantity 3
//! satchel wishlist add --product p2 --name "Sea Salt" --price 8
//! satchel cart show
//! ```

use std::fmt::Write as _;

use rust_decimal::Decimal;
use satchel_core::{Collection, CollectionKind};
use satchel_storefront::CollectionStore;
use satchel_storefront::local::LocalStorage;
use satchel_storefront::remote::RemoteCollection;

/// Render a collection as a plain-text table.
pub fn render<K: CollectionKind>(collection: &Collection<K>) -> String {
    if collection.is_empty() {
        return format!("Your {} is empty.\n", K::NAME);
    }

    let mut out = String::new();
    for item in collection.items() {
        let key = K::identity(item).to_string();
        let name = K::spec(item).name;
        if K::QUANTIFIED {
            let quantity = K::quantity(item);
            let line_total = (K::price(item) * Decimal::from(quantity)).to_string();
            let _ = writeln!(out, "{key:<24} {name:<32} x{quantity:<4} {line_total:>10}");
        } else {
            let price = K::price(item).to_string();
            let _ = writeln!(out, "{key:<24} {name:<32} {price:>10}");
        }
    }

    let _ = writeln!(
        out,
        "{} item(s), total {}",
        collection.item_count(),
        collection.total()
    );
    out
}

/// Print the current contents of a store.
#[allow(clippy::print_stdout)]
pub fn show<K, R, L>(store: &CollectionStore<K, R, L>)
where
    K: CollectionKind,
    R: RemoteCollection<K>,
    L: LocalStorage,
{
    if let Some(mode) = store.mode() {
        tracing::debug!(collection = K::NAME, ?mode, "Showing collection");
    }
    print!("{}", render(&store.snapshot()));
}
