//! Classification of observed trades into execution intents.

use tracing::warn;

use crate::models::{Position, TradeActivity};

/// What the bot should do in response to one observed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeIntent {
    /// Open or increase exposure, sized by the balance ratio
    Buy,
    /// Trim the mirrored position proportionally
    Sell,
    /// Fully liquidate the mirrored position — the source has fully exited
    Merge,
}

impl std::fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeIntent::Buy => "buy",
            TradeIntent::Sell => "sell",
            TradeIntent::Merge => "merge",
        };
        f.write_str(s)
    }
}

/// Map a trade and the source account's current position in its market to an
/// execution intent. Pure function; the source position must be the state
/// *after* the trade settled.
///
/// Unrecognized side values are logged and treated as buys rather than
/// dropped, so a feed quirk never silently loses a trade.
pub fn classify(trade: &TradeActivity, source_position: Option<&Position>) -> TradeIntent {
    match trade.side.to_uppercase().as_str() {
        "BUY" => TradeIntent::Buy,
        "SELL" => {
            if source_position.is_some_and(|p| p.is_open()) {
                TradeIntent::Sell
            } else {
                TradeIntent::Merge
            }
        }
        other => {
            warn!(side = %other, tx = %trade.transaction_hash, "Unknown trade side, defaulting to buy");
            TradeIntent::Buy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade_with_side(side: &str) -> TradeActivity {
        TradeActivity {
            transaction_hash: "0xabc".to_string(),
            condition_id: "0xcond".to_string(),
            asset: "42".to_string(),
            side: side.to_string(),
            size: dec!(10),
            price: dec!(0.5),
            usdc_size: dec!(5),
            timestamp: 0,
            processed: false,
            retry_count: 0,
        }
    }

    fn position(size: rust_decimal::Decimal) -> Position {
        Position::new("0xcond", "42", size)
    }

    #[test]
    fn buys_always_classify_as_buy() {
        assert_eq!(classify(&trade_with_side("BUY"), None), TradeIntent::Buy);
        assert_eq!(
            classify(&trade_with_side("BUY"), Some(&position(dec!(100)))),
            TradeIntent::Buy
        );
    }

    #[test]
    fn sell_with_remaining_source_position_is_partial() {
        assert_eq!(
            classify(&trade_with_side("SELL"), Some(&position(dec!(20)))),
            TradeIntent::Sell
        );
    }

    #[test]
    fn sell_with_no_source_position_is_merge() {
        assert_eq!(classify(&trade_with_side("SELL"), None), TradeIntent::Merge);
        assert_eq!(
            classify(&trade_with_side("SELL"), Some(&position(dec!(0)))),
            TradeIntent::Merge
        );
    }

    #[test]
    fn sides_are_case_insensitive() {
        assert_eq!(classify(&trade_with_side("buy"), None), TradeIntent::Buy);
        assert_eq!(classify(&trade_with_side("sell"), None), TradeIntent::Merge);
    }

    #[test]
    fn unknown_side_defaults_to_buy() {
        assert_eq!(classify(&trade_with_side("SPLIT"), None), TradeIntent::Buy);
        assert_eq!(classify(&trade_with_side(""), None), TradeIntent::Buy);
    }
}
