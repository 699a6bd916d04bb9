//! Activity model representing one observed trade on the source account.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::ActivityResponse;

/// One trade observed on the source account's activity feed.
///
/// The record is keyed by transaction hash and carries the execution state
/// the replication engine maintains: `processed` flips to true exactly once,
/// on a terminal outcome, and `retry_count` only ever grows until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeActivity {
    /// On-chain transaction hash (unique key)
    pub transaction_hash: String,

    /// Market condition ID (0x-prefixed)
    pub condition_id: String,

    /// Outcome token being traded
    pub asset: String,

    /// Trade direction as observed on the wire ("BUY" / "SELL").
    /// Kept as a string so unrecognized values survive to classification,
    /// where they are logged and defaulted rather than dropped.
    pub side: String,

    /// Number of outcome tokens traded
    pub size: Decimal,

    /// Price per token in USDC (0.0 to 1.0)
    pub price: Decimal,

    /// Total USDC value of the trade
    pub usdc_size: Decimal,

    /// When the trade occurred (unix seconds)
    pub timestamp: i64,

    /// Whether the engine reached a terminal outcome for this trade
    pub processed: bool,

    /// Failed execution passes so far
    pub retry_count: u32,
}

impl TradeActivity {
    /// Build a fresh, unexecuted record from an activity feed entry.
    pub fn from_response(activity: &ActivityResponse) -> Self {
        Self {
            transaction_hash: activity.transaction_hash.clone(),
            condition_id: activity.condition_id.clone(),
            asset: activity.asset.clone(),
            side: activity.side.clone(),
            size: activity.size,
            price: activity.price,
            usdc_size: activity.usdc_size,
            timestamp: activity.timestamp,
            processed: false,
            retry_count: 0,
        }
    }
}
