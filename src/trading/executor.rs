//! Proportional sizing and order execution for mirrored trades.
//!
//! The executor drains eligible trades from the activity store, sizes each
//! one against the two accounts' live balances and positions, and works the
//! order book with fill-or-kill tranches until the target size is filled,
//! the retry budget is spent, or the trade is abandoned (empty book, price
//! run-away, nothing to liquidate).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::api::{OrderBook, OrderResponse, OrderSide};
use crate::db::ActivityStore;
use crate::models::{Position, TradeActivity};

use super::classifier::{classify, TradeIntent};
use super::config::MirrorConfig;

/// Read-only market state the engine sizes and prices orders against.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Current positions of an account, one entry per market.
    async fn positions(&self, address: &str) -> Result<Vec<Position>>;

    /// Quote-currency (USDC) balance of an account.
    async fn balance(&self, address: &str) -> Result<Decimal>;

    /// Order book for an outcome token.
    async fn order_book(&self, asset: &str) -> Result<OrderBook>;
}

/// Submits sized and priced orders for execution.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit one fill-or-kill order. A transport failure is an `Err`; a
    /// rejection by the exchange is a response with `success = false`.
    async fn submit(&self, attempt: &ExecutionAttempt) -> Result<OrderResponse>;
}

#[async_trait]
impl<M: MarketFeed> MarketFeed for Arc<M> {
    async fn positions(&self, address: &str) -> Result<Vec<Position>> {
        (**self).positions(address).await
    }

    async fn balance(&self, address: &str) -> Result<Decimal> {
        (**self).balance(address).await
    }

    async fn order_book(&self, asset: &str) -> Result<OrderBook> {
        (**self).order_book(asset).await
    }
}

#[async_trait]
impl<G: OrderGateway> OrderGateway for Arc<G> {
    async fn submit(&self, attempt: &ExecutionAttempt) -> Result<OrderResponse> {
        (**self).submit(attempt).await
    }
}

/// One fill-or-kill order derived from a tranche of a mirrored trade.
/// For BUY the amount is in USDC; for SELL it is in outcome tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionAttempt {
    pub side: OrderSide,
    pub asset: String,
    pub amount: Decimal,
    pub price: Decimal,
}

/// Terminal result of one trade's fill loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The full target size was filled
    Completed,
    /// The trade was given up on without spending the retry budget
    Abandoned(AbandonReason),
    /// Consecutive rejections exhausted the retry budget
    Exhausted(u32),
}

/// Why a trade was abandoned rather than filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The opposing side of the book had no levels
    EmptyBook,
    /// The best ask drifted too far above the observed trade price
    PriceDeviation,
    /// Sizing produced nothing to trade (no position to exit, zero pool)
    NothingToTrade,
}

impl AbandonReason {
    fn as_str(&self) -> &'static str {
        match self {
            AbandonReason::EmptyBook => "empty order book",
            AbandonReason::PriceDeviation => "price moved too far",
            AbandonReason::NothingToTrade => "nothing to trade",
        }
    }
}

/// Gateway that logs orders without submitting them. Every tranche reports
/// as filled, so the rest of the pipeline runs end to end.
pub struct DryRunGateway;

#[async_trait]
impl OrderGateway for DryRunGateway {
    async fn submit(&self, attempt: &ExecutionAttempt) -> Result<OrderResponse> {
        info!(
            side = %attempt.side,
            asset = %attempt.asset,
            amount = %attempt.amount,
            price = %attempt.price,
            "[DRY RUN] Would submit order"
        );
        Ok(OrderResponse::accepted())
    }
}

/// Sized order ready for the fill loop.
#[derive(Debug, Clone, PartialEq)]
struct OrderPlan {
    side: OrderSide,
    remaining: Decimal,
}

/// The replication engine: selection loop, sizing, and the fill loop.
pub struct TradeExecutor<M, G> {
    config: MirrorConfig,
    source_address: String,
    bot_address: String,
    store: ActivityStore,
    market: M,
    gateway: G,
}

impl<M: MarketFeed, G: OrderGateway> TradeExecutor<M, G> {
    pub fn new(
        config: MirrorConfig,
        source_address: String,
        bot_address: String,
        store: ActivityStore,
        market: M,
        gateway: G,
    ) -> Self {
        Self {
            config,
            source_address,
            bot_address,
            store,
            market,
            gateway,
        }
    }

    /// Selection-and-execution loop. Runs until the shutdown flag is set;
    /// an in-flight trade finishes before the flag takes effect.
    pub async fn run(&self, shutdown: &AtomicBool) {
        info!(wallet = %self.bot_address, "Trade executor started");

        while !shutdown.load(Ordering::SeqCst) {
            match self.process_pass(shutdown).await {
                Ok(0) => {
                    debug!("No eligible trades, waiting");
                    tokio::time::sleep(Duration::from_secs(self.config.idle_delay_secs)).await;
                }
                Ok(handled) => {
                    debug!(handled = handled, "Execution pass complete");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    error!(error = %e, "Error in executor loop");
                    tokio::time::sleep(Duration::from_secs(self.config.error_delay_secs)).await;
                }
            }
        }

        info!("Trade executor stopped");
    }

    /// One pass over the store's eligible trades, strictly sequential.
    ///
    /// A trade that errors out is deferred: its retry counter is bumped and
    /// it stays unprocessed for a later pass, until the store's eligibility
    /// predicate retires it.
    pub async fn process_pass(&self, shutdown: &AtomicBool) -> Result<usize> {
        let trades = self.store.executable_trades(self.config.retry_limit).await?;
        if trades.is_empty() {
            return Ok(0);
        }

        info!(count = trades.len(), "Found trades to mirror");

        let mut handled = 0;
        for trade in &trades {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.process_trade(trade).await {
                warn!(
                    tx = %trade.transaction_hash,
                    error = %e,
                    "Trade deferred after error"
                );
                self.store.bump_retry(&trade.transaction_hash).await?;
            }
            handled += 1;
        }

        Ok(handled)
    }

    /// Classify, size, and execute a single trade, then finalize its record.
    async fn process_trade(&self, trade: &TradeActivity) -> Result<()> {
        info!(
            tx = %trade.transaction_hash,
            side = %trade.side,
            size = %trade.size,
            price = %trade.price,
            "Processing trade"
        );

        let bot_positions = self.market.positions(&self.bot_address).await?;
        let source_positions = self.market.positions(&self.source_address).await?;
        let bot_position = bot_positions
            .iter()
            .find(|p| p.condition_id == trade.condition_id);
        let source_position = source_positions
            .iter()
            .find(|p| p.condition_id == trade.condition_id);

        let bot_balance = self.market.balance(&self.bot_address).await?;
        let source_balance = self.market.balance(&self.source_address).await?;
        debug!(bot = %bot_balance, source = %source_balance, "Account balances");

        let intent = classify(trade, source_position);
        info!(tx = %trade.transaction_hash, intent = %intent, "Trade classified");

        let plan = match intent {
            TradeIntent::Buy => plan_buy(trade, bot_balance, source_balance),
            TradeIntent::Sell => plan_sell(trade, bot_position, source_position),
            TradeIntent::Merge => plan_merge(bot_position),
        };

        let outcome = match plan {
            Some(plan) => {
                // only buys chase a moving price and need the guard
                let reference_price = match intent {
                    TradeIntent::Buy => Some(trade.price),
                    _ => None,
                };
                self.fill(&trade.asset, plan.side, plan.remaining, reference_price)
                    .await?
            }
            None => FillOutcome::Abandoned(AbandonReason::NothingToTrade),
        };

        match outcome {
            FillOutcome::Completed => {
                self.store.mark_processed(&trade.transaction_hash).await?;
                info!(tx = %trade.transaction_hash, "Trade mirrored");
            }
            FillOutcome::Abandoned(reason) => {
                self.store.mark_processed(&trade.transaction_hash).await?;
                warn!(
                    tx = %trade.transaction_hash,
                    reason = reason.as_str(),
                    "Trade abandoned"
                );
            }
            FillOutcome::Exhausted(retries) => {
                self.store
                    .finish_with_retry_count(&trade.transaction_hash, retries)
                    .await?;
                warn!(
                    tx = %trade.transaction_hash,
                    retries = retries,
                    "Retry budget exhausted, giving up on trade"
                );
            }
        }

        Ok(())
    }

    /// Work the book until `remaining` is filled or the retry budget is spent.
    ///
    /// Each iteration takes the best opposing level, submits a fill-or-kill
    /// tranche capped by that level's liquidity, and either subtracts the
    /// tranche (resetting the rejection counter) or counts a rejection.
    /// Transport errors propagate to the pass-level caller.
    pub(crate) async fn fill(
        &self,
        asset: &str,
        side: OrderSide,
        mut remaining: Decimal,
        reference_price: Option<Decimal>,
    ) -> Result<FillOutcome> {
        let mut retries = 0u32;

        while remaining > Decimal::ZERO && retries < self.config.retry_limit {
            let book = self.market.order_book(asset).await?;

            let level = match side {
                OrderSide::Buy => book.best_ask(),
                OrderSide::Sell => book.best_bid(),
            };
            let Some(level) = level else {
                warn!(asset = %asset, side = %side, "No liquidity on opposing side of book");
                return Ok(FillOutcome::Abandoned(AbandonReason::EmptyBook));
            };
            let level = level.clone();

            if side == OrderSide::Buy {
                if let Some(observed) = reference_price {
                    if level.price - self.config.max_price_deviation > observed {
                        warn!(
                            ask = %level.price,
                            observed = %observed,
                            "Best ask too far above observed trade price"
                        );
                        return Ok(FillOutcome::Abandoned(AbandonReason::PriceDeviation));
                    }
                }
            }

            // level liquidity in the same units as `remaining`
            let available = match side {
                OrderSide::Buy => level.size * level.price,
                OrderSide::Sell => level.size,
            };
            let tranche = remaining.min(available);

            let attempt = ExecutionAttempt {
                side,
                asset: asset.to_string(),
                amount: tranche,
                price: level.price,
            };

            info!(
                side = %side,
                amount = %tranche,
                price = %level.price,
                remaining = %remaining,
                "Submitting order"
            );

            let response = self.gateway.submit(&attempt).await?;
            if response.success {
                retries = 0;
                remaining -= tranche;
                info!(remaining = %remaining, "Order filled");
            } else {
                retries += 1;
                warn!(
                    attempt = retries,
                    limit = self.config.retry_limit,
                    error = %response.error_msg,
                    "Order rejected"
                );
            }
        }

        if retries >= self.config.retry_limit {
            Ok(FillOutcome::Exhausted(retries))
        } else {
            Ok(FillOutcome::Completed)
        }
    }

    /// Liquidate every open bot position through the sell-side fill loop.
    /// Used by the close-all command; no store records are involved.
    pub async fn close_all_positions(&self) -> Result<usize> {
        let positions = self.market.positions(&self.bot_address).await?;
        let open: Vec<_> = positions.into_iter().filter(|p| p.is_open()).collect();

        info!(count = open.len(), "Closing all open positions");

        let mut closed = 0;
        for position in open {
            let outcome = self
                .fill(&position.asset, OrderSide::Sell, position.size, None)
                .await?;

            match outcome {
                FillOutcome::Completed => {
                    info!(asset = %position.asset, size = %position.size, "Position closed");
                    closed += 1;
                }
                FillOutcome::Abandoned(reason) => {
                    warn!(asset = %position.asset, reason = reason.as_str(), "Position left open");
                }
                FillOutcome::Exhausted(retries) => {
                    warn!(asset = %position.asset, retries = retries, "Position left open");
                }
            }
        }

        Ok(closed)
    }
}

/// Size a buy from the balance ratio: the bot commits the same share of its
/// bankroll as the source committed of theirs (measured before the trade).
/// Returns the target in quote-currency units.
fn plan_buy(
    trade: &TradeActivity,
    bot_balance: Decimal,
    source_balance: Decimal,
) -> Option<OrderPlan> {
    let pool = source_balance + trade.usdc_size;
    if pool <= Decimal::ZERO {
        return None;
    }

    let ratio = bot_balance / pool;
    Some(OrderPlan {
        side: OrderSide::Buy,
        remaining: trade.usdc_size * ratio,
    })
}

/// Size a partial close: trim the bot's position by the same fraction the
/// source trimmed theirs. Falls back to a full exit when the source position
/// has vanished by the time the trade is processed. Base-asset units.
fn plan_sell(
    trade: &TradeActivity,
    bot_position: Option<&Position>,
    source_position: Option<&Position>,
) -> Option<OrderPlan> {
    let bot = bot_position.filter(|p| p.is_open())?;

    let remaining = match source_position.filter(|p| p.is_open()) {
        None => bot.size,
        Some(source) => {
            let denominator = source.size + trade.size;
            if denominator.is_zero() {
                return None;
            }
            bot.size * (trade.size / denominator)
        }
    };

    Some(OrderPlan {
        side: OrderSide::Sell,
        remaining,
    })
}

/// Size a full exit: the source has fully exited, so the bot sheds its whole
/// position regardless of the trade's size. Base-asset units.
fn plan_merge(bot_position: Option<&Position>) -> Option<OrderPlan> {
    let bot = bot_position.filter(|p| p.is_open())?;
    Some(OrderPlan {
        side: OrderSide::Sell,
        remaining: bot.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BookLevel;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const SOURCE: &str = "0xsource";
    const BOT: &str = "0xbot";

    fn sample_trade(side: &str, size: Decimal, price: Decimal) -> TradeActivity {
        TradeActivity {
            transaction_hash: "0xtx".to_string(),
            condition_id: "0xcond".to_string(),
            asset: "42".to_string(),
            side: side.to_string(),
            size,
            price,
            usdc_size: size * price,
            timestamp: 1_700_000_000,
            processed: false,
            retry_count: 0,
        }
    }

    fn position(size: Decimal) -> Position {
        Position::new("0xcond", "42", size)
    }

    fn book(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> OrderBook {
        OrderBook {
            bids: bids
                .into_iter()
                .map(|(price, size)| BookLevel { price, size })
                .collect(),
            asks: asks
                .into_iter()
                .map(|(price, size)| BookLevel { price, size })
                .collect(),
            hash: String::new(),
            timestamp: String::new(),
        }
    }

    struct StubMarket {
        bot_positions: Vec<Position>,
        source_positions: Vec<Position>,
        bot_balance: Decimal,
        source_balance: Decimal,
        book: OrderBook,
        fail_positions: bool,
    }

    impl StubMarket {
        fn new(book: OrderBook) -> Self {
            Self {
                bot_positions: vec![],
                source_positions: vec![],
                bot_balance: Decimal::ZERO,
                source_balance: Decimal::ZERO,
                book,
                fail_positions: false,
            }
        }
    }

    #[async_trait]
    impl MarketFeed for StubMarket {
        async fn positions(&self, address: &str) -> Result<Vec<Position>> {
            if self.fail_positions {
                anyhow::bail!("position endpoint unavailable");
            }
            Ok(if address == BOT {
                self.bot_positions.clone()
            } else {
                self.source_positions.clone()
            })
        }

        async fn balance(&self, address: &str) -> Result<Decimal> {
            Ok(if address == BOT {
                self.bot_balance
            } else {
                self.source_balance
            })
        }

        async fn order_book(&self, _asset: &str) -> Result<OrderBook> {
            Ok(self.book.clone())
        }
    }

    struct StubGateway {
        replies: Mutex<VecDeque<bool>>,
        submitted: Mutex<Vec<ExecutionAttempt>>,
    }

    impl StubGateway {
        /// Every submission fills.
        fn always_ok() -> Self {
            Self::with_replies(vec![])
        }

        /// Scripted accept/reject responses; fills once the script runs out.
        fn with_replies(replies: Vec<bool>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                submitted: Mutex::new(Vec::new()),
            }
        }

        fn submissions(&self) -> Vec<ExecutionAttempt> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderGateway for StubGateway {
        async fn submit(&self, attempt: &ExecutionAttempt) -> Result<OrderResponse> {
            self.submitted.lock().unwrap().push(attempt.clone());
            let success = self.replies.lock().unwrap().pop_front().unwrap_or(true);
            if success {
                Ok(OrderResponse::accepted())
            } else {
                Ok(OrderResponse {
                    success: false,
                    error_msg: "not enough balance / allowance".to_string(),
                    order_id: None,
                    status: None,
                    transaction_hash: None,
                })
            }
        }
    }

    async fn build_executor(
        market: StubMarket,
        gateway: StubGateway,
        config: MirrorConfig,
    ) -> (
        TradeExecutor<Arc<StubMarket>, Arc<StubGateway>>,
        Arc<StubGateway>,
        ActivityStore,
    ) {
        let store = ActivityStore::in_memory().await.unwrap();
        let gateway = Arc::new(gateway);
        let executor = TradeExecutor::new(
            config,
            SOURCE.to_string(),
            BOT.to_string(),
            store.clone(),
            Arc::new(market),
            gateway.clone(),
        );
        (executor, gateway, store)
    }

    // ---- sizing ----

    #[test]
    fn buy_target_follows_balance_ratio() {
        let trade = sample_trade("BUY", dec!(100), dec!(0.5)); // 50 USDC
        let plan = plan_buy(&trade, dec!(100), dec!(150)).unwrap();

        assert_eq!(plan.side, OrderSide::Buy);
        // ratio = 100 / (150 + 50) = 0.5
        assert_eq!(plan.remaining, dec!(25));
    }

    #[test]
    fn buy_sizing_is_homogeneous() {
        let trade = sample_trade("BUY", dec!(60), dec!(0.5)); // 30 USDC
        let base = plan_buy(&trade, dec!(100), dec!(50)).unwrap();

        let mut doubled_trade = trade.clone();
        doubled_trade.usdc_size = trade.usdc_size * dec!(2);
        let doubled = plan_buy(&doubled_trade, dec!(200), dec!(100)).unwrap();

        assert_eq!(doubled.remaining, base.remaining * dec!(2));
    }

    #[test]
    fn buy_with_empty_pool_has_nothing_to_trade() {
        let mut trade = sample_trade("BUY", dec!(0), dec!(0.5));
        trade.usdc_size = Decimal::ZERO;
        assert!(plan_buy(&trade, dec!(100), Decimal::ZERO).is_none());
    }

    #[test]
    fn sell_trims_proportionally() {
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let bot = position(dec!(90));
        let source = position(dec!(20));

        let plan = plan_sell(&trade, Some(&bot), Some(&source)).unwrap();
        assert_eq!(plan.side, OrderSide::Sell);
        // ratio = 10 / (20 + 10) = 1/3 of a 90-token position
        assert_eq!(plan.remaining.round_dp(10), dec!(30));
    }

    #[test]
    fn sell_without_bot_position_has_nothing_to_trade() {
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        assert!(plan_sell(&trade, None, Some(&position(dec!(20)))).is_none());
        assert!(plan_sell(&trade, Some(&position(dec!(0))), Some(&position(dec!(20)))).is_none());
    }

    #[test]
    fn sell_with_vanished_source_position_exits_fully() {
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let bot = position(dec!(90));

        let plan = plan_sell(&trade, Some(&bot), None).unwrap();
        assert_eq!(plan.remaining, dec!(90));
    }

    #[test]
    fn merge_exits_the_whole_position() {
        let plan = plan_merge(Some(&position(dec!(40)))).unwrap();
        assert_eq!(plan.side, OrderSide::Sell);
        assert_eq!(plan.remaining, dec!(40));

        assert!(plan_merge(None).is_none());
        assert!(plan_merge(Some(&position(dec!(0)))).is_none());
    }

    // ---- fill loop ----

    #[tokio::test]
    async fn empty_book_abandons_without_submitting() {
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let mut market = StubMarket::new(book(vec![], vec![]));
        market.bot_positions = vec![position(dec!(40))];
        market.source_positions = vec![];

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        assert!(gateway.submissions().is_empty());
        let stored = store.find_activity("0xtx").await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn rejections_exhaust_the_retry_budget() {
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let mut market = StubMarket::new(book(vec![(dec!(0.48), dec!(100))], vec![]));
        market.bot_positions = vec![position(dec!(40))];

        let gateway = StubGateway::with_replies(vec![false, false, false]);
        let (executor, gateway, store) =
            build_executor(market, gateway, MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        // same tranche re-submitted on every attempt, nothing filled
        let submissions = gateway.submissions();
        assert_eq!(submissions.len(), 3);
        assert!(submissions.iter().all(|a| a.amount == dec!(40)));

        let stored = store.find_activity("0xtx").await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.retry_count, 3);
    }

    #[tokio::test]
    async fn tranches_split_across_book_liquidity() {
        // merge of 40 tokens against a best bid holding only 25
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let mut market = StubMarket::new(book(
            vec![(dec!(0.48), dec!(25)), (dec!(0.45), dec!(100))],
            vec![],
        ));
        market.bot_positions = vec![position(dec!(40))];

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        let submissions = gateway.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].amount, dec!(25));
        assert_eq!(submissions[0].price, dec!(0.48));
        assert_eq!(submissions[1].amount, dec!(15));

        assert!(store.find_activity("0xtx").await.unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn a_fill_resets_the_rejection_counter() {
        let mut config = MirrorConfig::default();
        config.retry_limit = 2;

        // two rejections would exhaust the budget; a fill in between must not
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let mut market = StubMarket::new(book(vec![(dec!(0.48), dec!(20))], vec![]));
        market.bot_positions = vec![position(dec!(40))];

        let gateway = StubGateway::with_replies(vec![false, true, false, true]);
        let (executor, gateway, store) = build_executor(market, gateway, config).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        assert_eq!(gateway.submissions().len(), 4);
        let stored = store.find_activity("0xtx").await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn buy_abandons_when_price_ran_away() {
        // observed at 0.50, best ask 0.56: past the 0.05 guard
        let trade = sample_trade("BUY", dec!(100), dec!(0.50));
        let mut market = StubMarket::new(book(vec![], vec![(dec!(0.56), dec!(500))]));
        market.bot_balance = dec!(100);
        market.source_balance = dec!(150);

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        assert!(gateway.submissions().is_empty());
        let stored = store.find_activity("0xtx").await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn buy_tranches_are_capped_in_quote_terms() {
        // target 25 USDC; best ask holds 20 tokens @ 0.5 = 10 USDC per refetch
        let trade = sample_trade("BUY", dec!(100), dec!(0.5));
        let mut market = StubMarket::new(book(vec![], vec![(dec!(0.5), dec!(20))]));
        market.bot_balance = dec!(100);
        market.source_balance = dec!(150);

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        let submissions = gateway.submissions();
        assert_eq!(submissions.len(), 3);
        assert_eq!(submissions[0].amount, dec!(10));
        assert_eq!(submissions[1].amount, dec!(10));
        assert_eq!(submissions[2].amount, dec!(5));
        assert!(submissions.iter().all(|a| a.side == OrderSide::Buy));
    }

    #[tokio::test]
    async fn sell_without_position_marks_processed_without_orders() {
        let trade = sample_trade("SELL", dec!(10), dec!(0.5));
        let mut market = StubMarket::new(book(vec![(dec!(0.48), dec!(100))], vec![]));
        market.source_positions = vec![position(dec!(20))];

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        executor.process_trade(&trade).await.unwrap();

        assert!(gateway.submissions().is_empty());
        assert!(store.find_activity("0xtx").await.unwrap().unwrap().processed);
    }

    // ---- pass-level behavior ----

    #[tokio::test]
    async fn transient_failures_defer_the_trade() {
        let trade = sample_trade("BUY", dec!(100), dec!(0.5));
        let mut market = StubMarket::new(book(vec![], vec![(dec!(0.5), dec!(500))]));
        market.fail_positions = true;

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;
        store.insert_activity(&trade).await.unwrap();

        let shutdown = AtomicBool::new(false);
        executor.process_pass(&shutdown).await.unwrap();

        assert!(gateway.submissions().is_empty());
        let stored = store.find_activity("0xtx").await.unwrap().unwrap();
        assert!(!stored.processed);
        assert_eq!(stored.retry_count, 1);

        // two more failing passes retire it from the eligibility query
        executor.process_pass(&shutdown).await.unwrap();
        executor.process_pass(&shutdown).await.unwrap();
        assert_eq!(executor.process_pass(&shutdown).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_between_trades() {
        let mut market = StubMarket::new(book(vec![], vec![(dec!(0.5), dec!(500))]));
        market.bot_balance = dec!(100);
        market.source_balance = dec!(150);

        let (executor, gateway, store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;

        let mut first = sample_trade("BUY", dec!(100), dec!(0.5));
        first.transaction_hash = "0x1".to_string();
        let mut second = sample_trade("BUY", dec!(100), dec!(0.5));
        second.transaction_hash = "0x2".to_string();
        store.insert_activity(&first).await.unwrap();
        store.insert_activity(&second).await.unwrap();

        let shutdown = AtomicBool::new(true);
        executor.process_pass(&shutdown).await.unwrap();

        // flag was already set: nothing was executed, nothing finalized
        assert!(gateway.submissions().is_empty());
        assert_eq!(store.stats().await.unwrap(), (2, 2, 0));
    }

    #[tokio::test]
    async fn close_all_liquidates_every_open_position() {
        let mut market = StubMarket::new(book(vec![(dec!(0.48), dec!(1000))], vec![]));
        market.bot_positions = vec![
            Position::new("0xc1", "41", dec!(30)),
            Position::new("0xc2", "42", dec!(0)),
            Position::new("0xc3", "43", dec!(15)),
        ];

        let (executor, gateway, _store) =
            build_executor(market, StubGateway::always_ok(), MirrorConfig::default()).await;

        let closed = executor.close_all_positions().await.unwrap();
        assert_eq!(closed, 2);

        let submissions = gateway.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions.iter().all(|a| a.side == OrderSide::Sell));
        assert_eq!(submissions[0].amount, dec!(30));
        assert_eq!(submissions[1].amount, dec!(15));
    }
}
