//! Satchel CLI - cart and wishlist from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Anonymous cart, kept in the data directory
//! satchel cart add --product p1 --name "Maple Resin" --price 13.59
//! satchel cart show
//!
//! # Sign in; local items migrate into the account
//! satchel login --token <customer-token>
//! satchel status
//!
//! # Sign out; the local (now empty) collections are shown again
//! satchel logout
//! ```
//!
//! # Commands
//!
//! - `cart` - Show or change the cart
//! - `wishlist` - Show or change the wishlist
//! - `login` / `logout` - Switch between anonymous and signed-in mode
//! - `status` - Show the session mode and collection sizes

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use satchel_core::{IdentityKey, ItemSpec, ProductId};
use satchel_storefront::StorefrontSession;
use satchel_storefront::config::StorefrontConfig;
use satchel_storefront::local::FileStorage;
use secrecy::SecretString;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about = "Satchel cart and wishlist client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show or change the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Sign in as a customer
    Login {
        /// Customer access token
        #[arg(short, long, env = "SATCHEL_CUSTOMER_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Sign out
    Logout,
    /// Show session mode and collection sizes
    Status,
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines
    Show,
    /// Add one unit of a product
    Add(AddArgs),
    /// Set the quantity of a line (0 removes it)
    Set {
        #[command(flatten)]
        item: ItemArgs,

        /// New quantity
        #[arg(short, long, allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove(ItemArgs),
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// List wishlist entries
    Show,
    /// Add a product
    Add(AddArgs),
    /// Remove a product
    Remove {
        /// Product ID
        #[arg(short, long)]
        product: ProductId,
    },
    /// Empty the wishlist
    Clear,
}

#[derive(clap::Args)]
struct ItemArgs {
    /// Product ID
    #[arg(short, long)]
    product: ProductId,

    /// Variant label
    #[arg(short, long)]
    variant: Option<String>,
}

impl ItemArgs {
    fn key(self) -> IdentityKey {
        match self.variant {
            Some(variant) => IdentityKey::variant(self.product, variant),
            None => IdentityKey::product(self.product),
        }
    }
}

#[derive(clap::Args)]
struct AddArgs {
    #[command(flatten)]
    item: ItemArgs,

    /// Display name
    #[arg(short, long)]
    name: String,

    /// Unit price
    #[arg(long)]
    price: Decimal,

    /// Image URL or asset key
    #[arg(long, default_value = "")]
    image: String,
}

impl AddArgs {
    fn spec(self) -> ItemSpec {
        let spec = ItemSpec::new(self.item.product, self.name, self.price, self.image);
        match self.item.variant {
            Some(variant) => spec.with_variant(variant),
            None => spec,
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "satchel_storefront=info,satchel=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

#[allow(clippy::print_stdout)]
async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = FileStorage::new(&config.data_dir);
    let token = commands::session::load_token(&storage)?;

    let session = StorefrontSession::mount(config.api.clone(), storage.clone(), token).await;

    match cli.command {
        Commands::Cart { action } => {
            let cart = session.cart();
            match action {
                CartAction::Show => {}
                CartAction::Add(args) => cart.add_item(args.spec()).await?,
                CartAction::Set { item, quantity } => {
                    cart.update_quantity(item.key(), quantity).await?;
                }
                CartAction::Remove(item) => cart.remove_item(item.key()).await?,
                CartAction::Clear => cart.clear().await?,
            }
            commands::collection::show(cart);
        }
        Commands::Wishlist { action } => {
            let wishlist = session.wishlist();
            match action {
                WishlistAction::Show => {}
                WishlistAction::Add(args) => wishlist.add_item(args.spec()).await?,
                WishlistAction::Remove { product } => {
                    wishlist.remove_item(IdentityKey::product(product)).await?;
                }
                WishlistAction::Clear => wishlist.clear().await?,
            }
            commands::collection::show(wishlist);
        }
        Commands::Login { token } => {
            let token = SecretString::from(token);
            commands::session::save_token(&storage, &token)?;
            session.login(token).await;
            println!(
                "Signed in: {} cart item(s), {} wishlist item(s)",
                session.cart().count(),
                session.wishlist().count()
            );
        }
        Commands::Logout => {
            commands::session::clear_token(&storage)?;
            session.logout().await;
            println!("Signed out");
        }
        Commands::Status => {
            println!(
                "cart: {:?}, {} item(s), total {}",
                session.cart().phase(),
                session.cart().count(),
                session.cart().total()
            );
            println!(
                "wishlist: {:?}, {} item(s)",
                session.wishlist().phase(),
                session.wishlist().count()
            );
        }
    }
    Ok(())
}
