//! Online retail CLI - migrations, seeding, and cart/order operations.
//!
//! # Usage
//!
//! ```bash
//! # Create the schema
//! retail-cli migrate
//!
//! # Load products and customers from YAML
//! retail-cli seed --file demos/seed.yaml
//!
//! # Work with a customer's cart
//! retail-cli cart add --customer 1 --product 2 --quantity 3
//! retail-cli cart show --customer 1
//! retail-cli cart clear --customer 1
//!
//! # Turn the cart into an order
//! retail-cli order place --customer 1
//! retail-cli order show --order 5
//! ```
//!
//! # Environment Variables
//!
//! - `RETAIL_DATABASE_URL` - `PostgreSQL` connection string (see `online_retail::config`)
//! - `RUST_LOG` - Log filter (default: `info`)
//! - `RETAIL_LOG_FORMAT` - `json` for structured logs, text otherwise

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use online_retail_core::{CustomerId, OrderId, ProductId};

mod commands;

#[derive(Parser)]
#[command(name = "retail-cli")]
#[command(author, version, about = "Online retail pipeline tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Load products and customers from a YAML file
    Seed {
        /// Path to the seed file
        #[arg(short, long, default_value = "demos/seed.yaml")]
        file: String,
    },
    /// Inspect or change a customer's cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place or inspect orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Add a product to the cart
    Add {
        #[arg(short, long)]
        customer: i32,
        #[arg(short, long)]
        product: i32,
        #[arg(short, long, default_value_t = 1)]
        quantity: i32,
    },
    /// Print the cart as JSON
    Show {
        #[arg(short, long)]
        customer: i32,
    },
    /// Remove every line from the cart
    Clear {
        #[arg(short, long)]
        customer: i32,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Convert the customer's cart into an order
    Place {
        #[arg(short, long)]
        customer: i32,
    },
    /// Print an order as JSON
    Show {
        #[arg(short, long)]
        order: i32,
    },
}

fn init_tracing() {
    // Defaults to info level if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());

    let json = std::env::var("RETAIL_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::run(&file).await?,
        Commands::Cart { action } => match action {
            CartAction::Add {
                customer,
                product,
                quantity,
            } => {
                commands::cart::add(CustomerId::new(customer), ProductId::new(product), quantity)
                    .await?;
            }
            CartAction::Show { customer } => commands::cart::show(CustomerId::new(customer)).await?,
            CartAction::Clear { customer } => {
                commands::cart::clear(CustomerId::new(customer)).await?;
            }
        },
        Commands::Order { action } => match action {
            OrderAction::Place { customer } => {
                commands::order::place(CustomerId::new(customer)).await?;
            }
            OrderAction::Show { order } => commands::order::show(OrderId::new(order)).await?,
        },
    }
    Ok(())
}
