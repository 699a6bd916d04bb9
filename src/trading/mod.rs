//! Trading logic: intent classification, proportional sizing, execution.

mod classifier;
mod config;
mod executor;

pub use classifier::{classify, TradeIntent};
pub use config::MirrorConfig;
pub use executor::{
    AbandonReason, DryRunGateway, ExecutionAttempt, FillOutcome, MarketFeed, OrderGateway,
    TradeExecutor,
};
