//! Activity store: persisted record of observed trades and their execution state.
//!
//! One row per transaction hash. The monitor inserts rows with
//! `processed = 0, retry_count = 0`; the executor owns every later
//! transition. Rows are never deleted here — archival is an external concern.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::models::TradeActivity;

/// Connection pool over the activity table.
#[derive(Clone)]
pub struct ActivityStore {
    pool: SqlitePool,
}

/// Raw activity row. Decimal columns are stored as TEXT to keep price/size
/// arithmetic exact across the store boundary.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredActivity {
    transaction_hash: String,
    condition_id: String,
    asset: String,
    side: String,
    size: String,
    price: String,
    usdc_size: String,
    timestamp: i64,
    processed: bool,
    retry_count: i64,
}

impl TryFrom<StoredActivity> for TradeActivity {
    type Error = anyhow::Error;

    fn try_from(row: StoredActivity) -> Result<Self> {
        Ok(TradeActivity {
            size: Decimal::from_str(&row.size).context("Corrupt size column")?,
            price: Decimal::from_str(&row.price).context("Corrupt price column")?,
            usdc_size: Decimal::from_str(&row.usdc_size).context("Corrupt usdc_size column")?,
            transaction_hash: row.transaction_hash,
            condition_id: row.condition_id,
            asset: row.asset,
            side: row.side,
            timestamp: row.timestamp,
            processed: row.processed,
            retry_count: row.retry_count.max(0) as u32,
        })
    }
}

impl ActivityStore {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive for the pool's lifetime.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                transaction_hash TEXT PRIMARY KEY,
                activity_type TEXT NOT NULL DEFAULT 'TRADE',
                condition_id TEXT NOT NULL,
                asset TEXT NOT NULL,
                side TEXT NOT NULL,
                size TEXT NOT NULL,
                price TEXT NOT NULL,
                usdc_size TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activities_pending ON activities(processed, activity_type)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a newly observed trade. Returns false if the transaction hash
    /// is already known, leaving the existing row untouched.
    pub async fn insert_activity(&self, activity: &TradeActivity) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO activities (
                transaction_hash, activity_type, condition_id, asset, side,
                size, price, usdc_size, timestamp, processed, retry_count
            ) VALUES (?, 'TRADE', ?, ?, ?, ?, ?, ?, ?, 0, 0)
            ON CONFLICT(transaction_hash) DO NOTHING
            "#,
        )
        .bind(&activity.transaction_hash)
        .bind(&activity.condition_id)
        .bind(&activity.asset)
        .bind(&activity.side)
        .bind(activity.size.to_string())
        .bind(activity.price.to_string())
        .bind(activity.usdc_size.to_string())
        .bind(activity.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Refresh the observed fields of a record the executor has not finished
    /// with. Execution state (processed, retry_count) is never touched.
    pub async fn refresh_unprocessed(&self, activity: &TradeActivity) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE activities SET
                side = ?,
                size = ?,
                price = ?,
                usdc_size = ?,
                timestamp = ?,
                updated_at = datetime('now')
            WHERE transaction_hash = ? AND processed = 0
            "#,
        )
        .bind(&activity.side)
        .bind(activity.size.to_string())
        .bind(activity.price.to_string())
        .bind(activity.usdc_size.to_string())
        .bind(activity.timestamp)
        .bind(&activity.transaction_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up one record by transaction hash.
    pub async fn find_activity(&self, transaction_hash: &str) -> Result<Option<TradeActivity>> {
        let row = sqlx::query_as::<_, StoredActivity>(
            "SELECT * FROM activities WHERE transaction_hash = ?",
        )
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TradeActivity::try_from).transpose()
    }

    /// Trades eligible for an execution pass: unprocessed TRADE records whose
    /// retry budget is not exhausted, in insertion order.
    pub async fn executable_trades(&self, retry_limit: u32) -> Result<Vec<TradeActivity>> {
        let rows = sqlx::query_as::<_, StoredActivity>(
            r#"
            SELECT * FROM activities
            WHERE activity_type = 'TRADE' AND processed = 0 AND retry_count < ?
            ORDER BY created_at
            "#,
        )
        .bind(retry_limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch executable trades")?;

        rows.into_iter().map(TradeActivity::try_from).collect()
    }

    /// Mark a trade as terminally handled, leaving its retry counter as is.
    pub async fn mark_processed(&self, transaction_hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE activities SET processed = 1, updated_at = datetime('now') WHERE transaction_hash = ?",
        )
        .bind(transaction_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a trade processed and persist the retry counter it exhausted.
    pub async fn finish_with_retry_count(
        &self,
        transaction_hash: &str,
        retry_count: u32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE activities SET
                processed = 1,
                retry_count = ?,
                updated_at = datetime('now')
            WHERE transaction_hash = ?
            "#,
        )
        .bind(retry_count as i64)
        .bind(transaction_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count a failed execution pass against the trade's retry budget.
    pub async fn bump_retry(&self, transaction_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE activities SET
                retry_count = retry_count + 1,
                updated_at = datetime('now')
            WHERE transaction_hash = ?
            "#,
        )
        .bind(transaction_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Total number of stored activity records.
    pub async fn count_activities(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Store statistics: (total, pending, processed).
    pub async fn stats(&self) -> Result<(i64, i64, i64)> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await?;

        let (pending,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM activities WHERE processed = 0")
                .fetch_one(&self.pool)
                .await?;

        let (processed,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM activities WHERE processed = 1")
                .fetch_one(&self.pool)
                .await?;

        Ok((total, pending, processed))
    }
}
