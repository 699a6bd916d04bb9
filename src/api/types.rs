//! Wire types for the Polymarket Data API and CLOB.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Activity feed entry from the /activity endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub proxy_wallet: String,
    pub condition_id: String,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub usdc_size: Decimal,
    pub timestamp: i64,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub outcome: String,
}

/// Position entry from the /positions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    #[serde(default)]
    pub proxy_wallet: String,
    pub condition_id: String,
    #[serde(default)]
    pub asset: String,
    pub size: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub outcome: String,
}

/// One price level of a CLOB order book. The CLOB encodes both fields as
/// decimal strings; they are parsed into exact decimals at the boundary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
}

/// Order book snapshot for one outcome token.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub timestamp: String,
}

impl OrderBook {
    /// Bid with the maximum price; first encountered wins ties.
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids
            .iter()
            .reduce(|best, level| if level.price > best.price { level } else { best })
    }

    /// Ask with the minimum price; first encountered wins ties.
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks
            .iter()
            .reduce(|best, level| if level.price < best.price { level } else { best })
    }
}

/// Side of an order submitted to the CLOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from CLOB order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
}

impl OrderResponse {
    /// A fully accepted order, as reported by the dry-run gateway.
    pub fn accepted() -> Self {
        Self {
            success: true,
            error_msg: String::new(),
            order_id: None,
            status: Some("matched".to_string()),
            transaction_hash: None,
        }
    }
}
