//! Trade discovery: polls the source account's activity feed into the store.
//!
//! The monitor only ever creates records or refreshes ones the executor has
//! not finished with; all execution-state transitions belong to the executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info};

use crate::api::{ActivityResponse, DataClient};
use crate::db::ActivityStore;
use crate::models::TradeActivity;
use crate::trading::MirrorConfig;

/// Polls the activity feed and keeps the store current.
pub struct TradeMonitor {
    config: MirrorConfig,
    store: ActivityStore,
    data: DataClient,
    source_address: String,
}

impl TradeMonitor {
    pub fn new(
        config: MirrorConfig,
        store: ActivityStore,
        data: DataClient,
        source_address: String,
    ) -> Self {
        Self {
            config,
            store,
            data,
            source_address,
        }
    }

    /// Verify the store is reachable before the loops start. Failure here is
    /// fatal to the process.
    pub async fn init(&self) -> Result<()> {
        let count = self
            .store
            .count_activities()
            .await
            .context("Failed to load activity history")?;
        info!(count = count, "Loaded existing activity records");
        Ok(())
    }

    /// Polling loop. Individual poll failures are logged and the loop
    /// continues; only the shutdown flag stops it.
    pub async fn run(&self, shutdown: &AtomicBool) {
        info!(
            source = %self.source_address,
            interval = self.config.fetch_interval_secs,
            "Trade monitor started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Error fetching activity");
            }
            tokio::time::sleep(Duration::from_secs(self.config.fetch_interval_secs)).await;
        }

        info!("Trade monitor stopped");
    }

    /// One poll: fetch recent trades, drop stale or malformed entries,
    /// insert unseen transaction hashes, refresh still-unprocessed ones.
    async fn poll_once(&self) -> Result<()> {
        let cutoff = Utc::now().timestamp() - self.config.stale_after_hours * 3600;

        let activities = self
            .data
            .get_activity(
                &self.source_address,
                "TRADE",
                self.config.activity_fetch_limit,
            )
            .await?;

        let mut inserted = 0;
        let mut refreshed = 0;

        for activity in &activities {
            if !is_mirrorable(activity, cutoff) {
                continue;
            }

            let record = TradeActivity::from_response(activity);
            match self.store.find_activity(&record.transaction_hash).await? {
                None => {
                    self.store.insert_activity(&record).await?;
                    inserted += 1;
                    info!(
                        tx = %record.transaction_hash,
                        side = %record.side,
                        size = %record.size,
                        price = %record.price,
                        "New trade detected"
                    );
                }
                Some(existing) if !existing.processed => {
                    self.store.refresh_unprocessed(&record).await?;
                    refreshed += 1;
                }
                Some(_) => {}
            }
        }

        if inserted > 0 || refreshed > 0 {
            info!(new = inserted, refreshed = refreshed, "Activity sync complete");
        }

        Ok(())
    }
}

/// A feed entry is worth storing when it is a TRADE, carries a transaction
/// hash to key on, and is newer than the staleness cutoff.
fn is_mirrorable(activity: &ActivityResponse, cutoff: i64) -> bool {
    activity.activity_type == "TRADE"
        && !activity.transaction_hash.is_empty()
        && activity.timestamp >= cutoff
}
