//! Polymarket trade-mirroring bot.
//!
//! Watches a source account's trades and replays them on a bot-controlled
//! proxy wallet, scaled to the bot's bankroll.

mod api;
mod bot;
mod db;
mod models;
mod monitor;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{ChainClient, ClobClient, DataClient};
use crate::bot::{Bot, BotConfig, LiveMarket};
use crate::db::ActivityStore;
use crate::trading::{MirrorConfig, TradeExecutor};

/// Polymarket trade-mirroring CLI.
#[derive(Parser)]
#[command(name = "polymirror")]
#[command(about = "Mirror a Polymarket account's trades with proportional sizing", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./polymirror.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mirroring the source account's trades
    Run {
        /// Source account whose trades are mirrored
        #[arg(short, long, env = "SOURCE_WALLET")]
        source: String,

        /// Bot proxy wallet holding balances and positions
        #[arg(short, long, env = "PROXY_WALLET")]
        wallet: String,

        /// Polygon RPC endpoint for balance reads
        #[arg(long, env = "POLYGON_RPC_URL", default_value = "https://polygon-rpc.com")]
        rpc_url: String,

        /// Activity polling interval in seconds
        #[arg(short, long, default_value = "1")]
        interval: u64,

        /// Log orders instead of submitting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show activity store statistics
    Status,

    /// Liquidate every open bot position
    CloseAll {
        /// Bot proxy wallet to liquidate
        #[arg(short, long, env = "PROXY_WALLET")]
        wallet: String,

        /// Polygon RPC endpoint for balance reads
        #[arg(long, env = "POLYGON_RPC_URL", default_value = "https://polygon-rpc.com")]
        rpc_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            source,
            wallet,
            rpc_url,
            interval,
            dry_run,
        } => {
            info!(
                source = %source,
                wallet = %wallet,
                interval = interval,
                dry_run = dry_run,
                "Starting trade mirror"
            );

            let mirror = MirrorConfig {
                fetch_interval_secs: interval,
                ..MirrorConfig::default()
            };

            let config = BotConfig {
                source_address: source.clone(),
                bot_address: wallet.clone(),
                database_url: cli.database.clone(),
                rpc_url,
                dry_run,
                mirror,
            };

            println!("\n=== Polymarket Trade Mirror ===");
            println!("Source wallet: {}", source);
            println!("Bot wallet:    {}", wallet);
            println!("Poll interval: {}s", interval);
            println!(
                "Mode:          {}",
                if dry_run { "DRY RUN (no real orders)" } else { "LIVE TRADING" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let bot = Bot::new(config).await?;
            bot.run().await?;
        }

        Commands::Status => {
            let store = ActivityStore::new(&cli.database).await?;
            let (total, pending, processed) = store.stats().await?;

            println!("\n=== Activity Store ===");
            println!("Total trades:  {}", total);
            println!("Pending:       {}", pending);
            println!("Processed:     {}", processed);
        }

        Commands::CloseAll { wallet, rpc_url } => {
            info!(wallet = %wallet, "Liquidating all open positions");

            let store = ActivityStore::new(&cli.database).await?;
            let market = LiveMarket::new(DataClient::new()?, ChainClient::new(rpc_url)?);
            let gateway = ClobClient::from_env()?;

            let executor = TradeExecutor::new(
                MirrorConfig::default(),
                wallet.clone(),
                wallet,
                store,
                market,
                gateway,
            );

            let closed = executor.close_all_positions().await?;
            println!("Closed {} position(s)", closed);
        }
    }

    Ok(())
}
