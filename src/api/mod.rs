//! Polymarket API clients: market data, on-chain balances, order execution.

mod chain_client;
mod clob_client;
mod data_client;
mod types;

pub use chain_client::ChainClient;
pub use clob_client::ClobClient;
pub use data_client::DataClient;
pub use types::{ActivityResponse, BookLevel, OrderBook, OrderResponse, OrderSide, PositionResponse};
