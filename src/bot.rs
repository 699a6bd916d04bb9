//! Bot wiring: the discovery and execution loops over a shared store.
//!
//! The two loops never talk to each other directly — the activity store is
//! the only channel between them. A shared atomic flag, set by the ctrl-c
//! handler, stops both cooperatively; an in-flight trade completes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::api::{ChainClient, ClobClient, DataClient, OrderBook, OrderResponse};
use crate::db::ActivityStore;
use crate::models::Position;
use crate::monitor::TradeMonitor;
use crate::trading::{
    DryRunGateway, ExecutionAttempt, MarketFeed, MirrorConfig, OrderGateway, TradeExecutor,
};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Account whose trades are mirrored
    pub source_address: String,

    /// Proxy wallet executing the mirrored orders
    pub bot_address: String,

    /// Database URL
    pub database_url: String,

    /// Polygon RPC endpoint for balance reads
    pub rpc_url: String,

    /// Log orders instead of submitting them
    pub dry_run: bool,

    /// Engine tunables
    pub mirror: MirrorConfig,
}

/// Production market feed: Data API for positions and order books, chain
/// state for balances.
pub struct LiveMarket {
    data: DataClient,
    chain: ChainClient,
}

impl LiveMarket {
    pub fn new(data: DataClient, chain: ChainClient) -> Self {
        Self { data, chain }
    }
}

#[async_trait]
impl MarketFeed for LiveMarket {
    async fn positions(&self, address: &str) -> Result<Vec<Position>> {
        self.data.get_positions(address).await
    }

    async fn balance(&self, address: &str) -> Result<Decimal> {
        self.chain.usdc_balance(address).await
    }

    async fn order_book(&self, asset: &str) -> Result<OrderBook> {
        self.data.get_order_book(asset).await
    }
}

#[async_trait]
impl OrderGateway for ClobClient {
    async fn submit(&self, attempt: &ExecutionAttempt) -> Result<OrderResponse> {
        self.submit_fok_order(&attempt.asset, attempt.side, attempt.amount, attempt.price)
            .await
    }
}

/// Runs the monitor and executor until shutdown.
pub struct Bot {
    config: BotConfig,
    store: ActivityStore,
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    /// Connect the store and build the bot.
    pub async fn new(config: BotConfig) -> Result<Self> {
        let store = ActivityStore::new(&config.database_url).await?;

        Ok(Self {
            config,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shutdown flag for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Start both loops and block until they stop.
    pub async fn run(&self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        let monitor = TradeMonitor::new(
            self.config.mirror.clone(),
            self.store.clone(),
            DataClient::new()?,
            self.config.source_address.clone(),
        );
        monitor.init().await.context("Trade monitor initialization failed")?;

        let monitor_shutdown = self.shutdown.clone();
        let monitor_handle = tokio::spawn(async move {
            monitor.run(&monitor_shutdown).await;
        });

        let market = LiveMarket::new(
            DataClient::new()?,
            ChainClient::new(self.config.rpc_url.clone())?,
        );

        if self.config.dry_run {
            info!("Dry-run mode: orders will be logged, not submitted");
            let executor = TradeExecutor::new(
                self.config.mirror.clone(),
                self.config.source_address.clone(),
                self.config.bot_address.clone(),
                self.store.clone(),
                market,
                DryRunGateway,
            );
            executor.run(&self.shutdown).await;
        } else {
            let gateway = ClobClient::from_env().context("CLOB client not configured")?;
            info!(address = ?gateway.address(), "CLOB client initialized");
            let executor = TradeExecutor::new(
                self.config.mirror.clone(),
                self.config.source_address.clone(),
                self.config.bot_address.clone(),
                self.store.clone(),
                market,
                gateway,
            );
            executor.run(&self.shutdown).await;
        }

        monitor_handle.await.context("Monitor task panicked")?;
        info!("Shutdown complete");

        Ok(())
    }
}
