//! Replication engine configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Tunables for trade discovery and execution.
///
/// `retry_limit` bounds both the per-tranche retry loop and the number of
/// failed passes a trade survives in the store before it is retired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Order submission attempts before giving up on a trade
    pub retry_limit: u32,

    /// Maximum the best ask may sit above the observed trade price before a
    /// buy is abandoned
    pub max_price_deviation: Decimal,

    /// Activity feed polling interval (seconds)
    pub fetch_interval_secs: u64,

    /// Trades older than this never enter the store (hours)
    pub stale_after_hours: i64,

    /// Executor sleep when no eligible trades are found (seconds)
    pub idle_delay_secs: u64,

    /// Executor sleep after an unexpected pass-level error (seconds)
    pub error_delay_secs: u64,

    /// Activity records requested per poll
    pub activity_fetch_limit: u32,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            max_price_deviation: dec!(0.05), // 5 cents on a 0-1 market
            fetch_interval_secs: 1,
            stale_after_hours: 24,
            idle_delay_secs: 2,
            error_delay_secs: 5,
            activity_fetch_limit: 100,
        }
    }
}
