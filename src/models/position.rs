//! Position snapshot for an account's holdings in a single market.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time position of an account in one market.
///
/// Fetched fresh from the Data API before each trade is processed;
/// never persisted or mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Market condition ID
    pub condition_id: String,

    /// Outcome token held
    pub asset: String,

    /// Number of outcome tokens held
    pub size: Decimal,
}

impl Position {
    pub fn new(condition_id: impl Into<String>, asset: impl Into<String>, size: Decimal) -> Self {
        Self {
            condition_id: condition_id.into(),
            asset: asset.into(),
            size,
        }
    }

    /// True when the account holds any of the outcome token.
    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }
}
