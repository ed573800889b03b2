// ============================================================================
// Trades Engine Library
// Order matching core of a currency exchange
// ============================================================================

//! # Trades Engine
//!
//! Limit order books with price-time matching, one single-writer engine per
//! currency pair, fed by a sequenced command channel and publishing every
//! outcome on a fan-out event bus.
//!
//! ## Features
//!
//! - **Single-writer matching**: the [`Exchange`](engine::Exchange) lives on
//!   one thread behind the [`InputSequencer`](pipeline::InputSequencer)
//! - **Price-time priority** behind the pluggable
//!   [`MatchingAlgorithm`](interfaces::MatchingAlgorithm) trait
//! - **Output event bus** with bounded, backpressured subscriber channels
//! - **Memory images** for BBO, depth, orders and OHLC bars
//! - **Journal** of checksummed records, with book recovery
//!
//! ## Example
//!
//! ```rust
//! use trades_engine::prelude::*;
//! use std::time::Duration;
//!
//! let config = ExchangeConfig::coin_exchange();
//! let bbo = BboMemoryImage::new();
//! let pipeline = TradingPipeline::start(&config, vec![Box::new(bbo.clone())]).unwrap();
//!
//! let order = PlaceOrder::limit(
//!     "1",
//!     "trader-1",
//!     "BTCUSD",
//!     Side::Buy,
//!     "493.34".parse().unwrap(),
//!     Volume::from_integer(250).unwrap(),
//! );
//! let receipt = pipeline.handle().submit(order).unwrap().wait().unwrap();
//! assert_eq!(receipt.sequence, 1);
//!
//! assert!(pipeline.wait_until_drained(Duration::from_secs(5)));
//! let best = bbo.get(&"BTCUSD".into()).unwrap();
//! assert_eq!(best.best_bid_volume, Volume::from_integer(250).unwrap());
//!
//! pipeline.shutdown().unwrap();
//! ```

pub mod domain;
pub mod engine;
pub mod interfaces;
pub mod journal;
#[cfg(feature = "logging")]
pub mod logging;
pub mod numeric;
pub mod pipeline;
pub mod read_model;
mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::order::state::{OrderStatus, OrderStatusTransition};
    pub use crate::domain::{
        Bbo, CurrencyPair, Depth, DepthLevel, ExchangeConfig, LimitOrderBook,
        LimitOrderBookSnapshot, Order, OrderId, OrderSnapshot, OrderType, Side, Trade, TradeId,
        TraderId,
    };
    pub use crate::engine::{
        CancelOutcome, Exchange, ExchangeError, Execution, MatchingEngine, PriceTimePriority,
    };
    pub use crate::interfaces::{
        EventHandler, EventStore, EventSubscriber, LoggingEventHandler, MatchingAlgorithm,
        NoOpEventHandler, OutputEvent, PublishError, SequencedEvent,
    };
    pub use crate::journal::{FileEventStore, InMemoryEventStore, Journaler};
    pub use crate::numeric::{Price, Volume};
    pub use crate::pipeline::{
        CancelOrder, Command, CommandOutcome, OutputBus, PlaceOrder, RetryPolicy,
        SequencerHandle, TradingPipeline,
    };
    pub use crate::read_model::{
        BboMemoryImage, DepthMemoryImage, OhlcMemoryImage, OrderMemoryImage,
    };
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use crate::interfaces::CollectingEventHandler;
    use crate::journal::restore_exchange;
    use crate::pipeline::{CommandReceipt, SubmitError};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    const PAIR: &str = "BTCUSD";

    fn price(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    fn volume(value: i64) -> Volume {
        Volume::from_integer(value).unwrap()
    }

    fn limit(id: &str, trader: &str, side: Side, p: Decimal, v: i64) -> PlaceOrder {
        PlaceOrder::limit(id, trader, PAIR, side, price(p), volume(v))
    }

    /// Full pipeline with every memory image and an in-memory journal
    struct Harness {
        pipeline: TradingPipeline,
        bbo: BboMemoryImage,
        depth: DepthMemoryImage,
        orders: OrderMemoryImage,
        journal: InMemoryEventStore,
    }

    impl Harness {
        fn start() -> Self {
            let config = ExchangeConfig::coin_exchange().with_retry(RetryPolicy::immediate());
            let bbo = BboMemoryImage::new();
            let depth = DepthMemoryImage::new(config.depth_levels);
            let orders = OrderMemoryImage::new();
            let journal = InMemoryEventStore::new();

            let pipeline = TradingPipeline::start(
                &config,
                vec![
                    Box::new(Journaler::new(journal.clone())),
                    Box::new(bbo.clone()),
                    Box::new(depth.clone()),
                    Box::new(orders.clone()),
                ],
            )
            .unwrap();

            Self {
                pipeline,
                bbo,
                depth,
                orders,
                journal,
            }
        }

        fn submit(&self, command: impl Into<Command>) -> CommandReceipt {
            self.pipeline.handle().submit(command).unwrap().wait().unwrap()
        }

        fn settle(&self) {
            assert!(self.pipeline.wait_until_drained(Duration::from_secs(5)));
        }
    }

    // ========================================================================
    // Example scenarios
    // ========================================================================

    #[test]
    fn test_best_bid_is_highest_buy() {
        let harness = Harness::start();
        harness.submit(limit("1", "t1", Side::Buy, dec!(493.34), 250));
        harness.submit(limit("2", "t1", Side::Buy, dec!(491.34), 100));
        harness.settle();

        let bbo = harness.bbo.get(&PAIR.into()).unwrap();
        assert_eq!(bbo.best_bid_price, price(dec!(493.34)));
        assert_eq!(bbo.best_bid_volume, volume(250));
        assert_eq!(bbo.best_bid_order_count, 1);
        assert_eq!(bbo.best_ask_price, Price::ZERO);

        harness.pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_crossing_limit_fills_both_orders() {
        let harness = Harness::start();
        harness.submit(limit("1", "seller", Side::Sell, dec!(496.34), 250));
        let receipt = harness.submit(limit("2", "buyer", Side::Buy, dec!(496.34), 250));

        let execution = receipt.result.unwrap().execution().cloned().unwrap();
        assert_eq!(execution.trades.len(), 1);
        assert_eq!(execution.trades[0].execution_price, price(dec!(496.34)));
        assert_eq!(execution.trades[0].executed_volume, volume(250));
        assert_eq!(execution.order.status, OrderStatus::Filled);

        harness.settle();
        assert_eq!(harness.orders.order(&"1".into()).unwrap().status, OrderStatus::Filled);
        assert_eq!(harness.orders.order(&"2".into()).unwrap().status, OrderStatus::Filled);
        let bbo = harness.bbo.get(&PAIR.into()).unwrap();
        assert_eq!(bbo.best_bid_volume, Volume::ZERO);
        assert_eq!(bbo.best_ask_volume, Volume::ZERO);

        let (exchange, _) = harness.pipeline.shutdown().unwrap();
        assert!(exchange.book(&PAIR.into()).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_one_of_two_orders_at_a_level() {
        let harness = Harness::start();
        harness.submit(limit("1", "t1", Side::Buy, dec!(493.34), 100));
        harness.submit(limit("2", "t1", Side::Buy, dec!(493.34), 100));
        harness.settle();

        let level = harness.depth.bid_depth(&PAIR.into())[0];
        assert_eq!(level.volume, volume(200));
        assert_eq!(level.order_count, 2);

        let receipt = harness.submit(CancelOrder::new("1", "t1", PAIR));
        assert!(receipt.result.unwrap().cancel_outcome().unwrap().is_cancelled());
        harness.settle();

        let bids = harness.depth.bid_depth(&PAIR.into());
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].price, price(dec!(493.34)));
        assert_eq!(bids[0].volume, volume(100));
        assert_eq!(bids[0].order_count, 1);

        harness.pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_market_order_executes_at_resting_price() {
        let harness = Harness::start();
        harness.submit(limit("1", "t1", Side::Buy, dec!(10), 5));
        let receipt = harness.submit(PlaceOrder::market("2", "t2", PAIR, Side::Sell, volume(5)));

        let execution = receipt.result.unwrap().execution().cloned().unwrap();
        assert_eq!(execution.trades.len(), 1);
        assert_eq!(execution.trades[0].execution_price, price(dec!(10)));
        assert_eq!(execution.order.status, OrderStatus::Filled);

        harness.settle();
        assert_eq!(harness.orders.order(&"1".into()).unwrap().status, OrderStatus::Filled);
        harness.pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_cancel_of_filled_order_reports_failure() {
        let harness = Harness::start();
        harness.submit(limit("1", "t1", Side::Buy, dec!(10), 5));
        harness.submit(limit("2", "t2", Side::Sell, dec!(10), 5));
        harness.submit(limit("3", "t3", Side::Buy, dec!(9), 1));
        harness.settle();

        let before = harness.bbo.get(&PAIR.into()).unwrap();
        let published = harness.pipeline.publisher().published();

        let receipt = harness.submit(CancelOrder::new("1", "t1", PAIR));
        assert_eq!(
            receipt.result.unwrap().cancel_outcome(),
            Some(&CancelOutcome::NotFound)
        );
        harness.settle();

        assert_eq!(harness.pipeline.publisher().published(), published);
        assert_eq!(harness.bbo.get(&PAIR.into()).unwrap(), before);
        harness.pipeline.shutdown().unwrap();
    }

    // ========================================================================
    // Pipeline behavior
    // ========================================================================

    #[test]
    fn test_rejected_command_never_reaches_exchange() {
        let harness = Harness::start();

        let err = harness
            .pipeline
            .handle()
            .submit(PlaceOrder::limit("1", "t1", "ETHUSD", Side::Buy, price(dec!(1)), volume(1)))
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));

        let receipt = harness.submit(limit("2", "t1", Side::Buy, dec!(1), 1));
        assert_eq!(receipt.sequence, 1);
        harness.pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_journal_sees_every_event_after_shutdown() {
        let harness = Harness::start();
        for i in 0..20 {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            harness.submit(limit(&format!("o{i}"), "t1", side, dec!(100), 1 + i % 3));
        }

        let journal = harness.journal.clone();
        let (_, stats) = harness.pipeline.shutdown().unwrap();

        let records = journal.read_all().unwrap();
        assert_eq!(records.len() as u64, stats.published);
        let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, (1..=stats.published).collect::<Vec<_>>());
        assert!(stats.subscribers.iter().all(|s| s.processed == stats.published));
    }

    #[test]
    fn test_restart_from_file_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.journal");
        let config = ExchangeConfig::coin_exchange();

        {
            let store = FileEventStore::open(&path).unwrap();
            let pipeline =
                TradingPipeline::start(&config, vec![Box::new(Journaler::new(store))]).unwrap();
            let handle = pipeline.handle();
            for (id, side, p) in [("1", Side::Buy, dec!(99)), ("2", Side::Sell, dec!(101))] {
                handle.submit(limit(id, "t1", side, p, 10)).unwrap().wait().unwrap();
            }
            handle
                .submit(limit("3", "t2", Side::Sell, dec!(99), 4))
                .unwrap()
                .wait()
                .unwrap();
            pipeline.shutdown().unwrap();
        }

        let mut exchange = Exchange::detached(&config).unwrap();
        let store = FileEventStore::open(&path).unwrap();
        assert_eq!(restore_exchange(&mut exchange, &store).unwrap(), 1);

        let book = exchange.book(&PAIR.into()).unwrap();
        assert_eq!(book.get(&"1".into()).unwrap().open_quantity(), volume(6));
        assert!(book.contains(&"2".into()));

        let orders = OrderMemoryImage::new();
        let pipeline =
            TradingPipeline::start_with(exchange, &config, vec![Box::new(orders.clone())]).unwrap();
        let receipt = pipeline
            .handle()
            .submit(PlaceOrder::market("4", "t3", PAIR, Side::Sell, volume(6)))
            .unwrap()
            .wait()
            .unwrap();
        let execution = receipt.result.unwrap().execution().cloned().unwrap();
        assert_eq!(execution.trades[0].buy_order.order_id.as_str(), "1");
        assert_eq!(execution.order.status, OrderStatus::Filled);

        assert!(pipeline.wait_until_drained(Duration::from_secs(5)));
        assert_eq!(orders.order(&"1".into()).unwrap().status, OrderStatus::Filled);
        pipeline.shutdown().unwrap();
    }

    // ========================================================================
    // Properties
    // ========================================================================

    #[derive(Debug, Clone)]
    enum Op {
        Limit(Side, i64, i64),
        Market(Side, i64),
        Cancel(usize),
    }

    fn side() -> impl Strategy<Value = Side> {
        prop_oneof![Just(Side::Buy), Just(Side::Sell)]
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (side(), 95i64..105, 1i64..20).prop_map(|(s, p, v)| Op::Limit(s, p, v)),
            1 => (side(), 1i64..40).prop_map(|(s, v)| Op::Market(s, v)),
            1 => (0usize..64).prop_map(Op::Cancel),
        ]
    }

    /// Checks every trade of one execution against the open quantities
    /// the resting orders had before it
    fn check_trades(
        execution: &Execution,
        resting_before: &HashMap<OrderId, Volume>,
        original: &HashMap<OrderId, Volume>,
        executed: &mut HashMap<OrderId, Volume>,
    ) -> Result<(), TestCaseError> {
        for trade in &execution.trades {
            let resting = trade.resting_order();
            prop_assert!(trade.executed_volume <= resting_before[&resting.order_id]);
            prop_assert_eq!(trade.execution_price, resting.price);

            for order_id in [&trade.buy_order.order_id, &trade.sell_order.order_id] {
                let total = executed.entry(order_id.clone()).or_insert(Volume::ZERO);
                *total = total.checked_add(trade.executed_volume).unwrap();
                prop_assert!(*total <= original[order_id]);
            }
        }
        Ok(())
    }

    fn check_book(book: &LimitOrderBook, last_bbo: &Bbo) -> Result<(), TestCaseError> {
        prop_assert!(!book.is_crossed());

        for side in [book.bids(), book.asks()] {
            if let Some(level) = side.best_level() {
                let open: Volume = level.orders().map(|o| o.open_quantity()).sum();
                prop_assert_eq!(level.volume(), open);
            }
        }

        // What a BBO image holds after the last published event
        prop_assert_eq!(&book.bbo(), last_bbo);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_book_invariants(ops in prop::collection::vec(op(), 1..80)) {
            let events = Arc::new(CollectingEventHandler::new());
            let config = ExchangeConfig::new([PAIR]);
            let mut exchange = Exchange::new(&config, events.clone()).unwrap();
            let pair = CurrencyPair::new(PAIR);

            let mut placed: Vec<OrderId> = Vec::new();
            let mut original: HashMap<OrderId, Volume> = HashMap::new();
            let mut executed: HashMap<OrderId, Volume> = HashMap::new();
            let mut last_bbo = Bbo::empty(pair.clone());

            for (i, op) in ops.into_iter().enumerate() {
                let id = OrderId::new(format!("o{i}"));
                let resting_before: HashMap<OrderId, Volume> = {
                    let book = exchange.book(&pair).unwrap();
                    book.bids()
                        .orders()
                        .chain(book.asks().orders())
                        .map(|o| (o.id.clone(), o.open_quantity()))
                        .collect()
                };

                match op {
                    Op::Limit(side, p, v) => {
                        original.insert(id.clone(), volume(v));
                        let order = PlaceOrder::limit(id.clone(), "t", PAIR, side, Price::from_integer(p).unwrap(), volume(v));
                        let execution = exchange.place_new_order(order.into_order()).unwrap();
                        check_trades(&execution, &resting_before, &original, &mut executed)?;
                        placed.push(id);
                    }
                    Op::Market(side, v) => {
                        original.insert(id.clone(), volume(v));
                        let order = PlaceOrder::market(id.clone(), "t", PAIR, side, volume(v));
                        let execution = exchange.place_new_order(order.into_order()).unwrap();
                        check_trades(&execution, &resting_before, &original, &mut executed)?;
                        prop_assert!(execution.order.status.is_terminal());
                        prop_assert!(!exchange.book(&pair).unwrap().contains(&id));
                    }
                    Op::Cancel(index) if !placed.is_empty() => {
                        let target = placed[index % placed.len()].clone();
                        let cancel = CancelOrder::new(target, "t", PAIR);
                        let first = exchange.cancel_order(&cancel).unwrap();

                        let snapshot = exchange.book(&pair).unwrap().snapshot();
                        let second = exchange.cancel_order(&cancel).unwrap();
                        prop_assert_eq!(second, CancelOutcome::NotFound);
                        prop_assert_eq!(exchange.book(&pair).unwrap().snapshot(), snapshot);
                        if let CancelOutcome::Cancelled(order) = first {
                            prop_assert_eq!(order.status, OrderStatus::Cancelled);
                        }
                    }
                    Op::Cancel(_) => {}
                }

                for event in events.drain() {
                    if let OutputEvent::Bbo(bbo) = event {
                        last_bbo = bbo;
                    }
                }
                check_book(exchange.book(&pair).unwrap(), &last_bbo)?;
            }
        }

        #[test]
        fn prop_price_time_priority(volumes in prop::collection::vec(1i64..10, 1..10), take in 1i64..60) {
            let mut exchange = Exchange::detached(&ExchangeConfig::new([PAIR])).unwrap();
            for (i, v) in volumes.iter().enumerate() {
                let order = limit(&format!("s{i}"), "maker", Side::Sell, dec!(100), *v);
                exchange.place_new_order(order.into_order()).unwrap();
            }

            let taker = PlaceOrder::market("taker", "taker", PAIR, Side::Buy, volume(take));
            let execution = exchange.place_new_order(taker.into_order()).unwrap();

            // Makers are consumed strictly in arrival order
            for (i, trade) in execution.trades.iter().enumerate() {
                prop_assert_eq!(trade.sell_order.order_id.as_str(), format!("s{i}"));
                if i + 1 < execution.trades.len() {
                    prop_assert_eq!(trade.sell_order.status, OrderStatus::Filled);
                }
            }

            let available: i64 = volumes.iter().sum();
            let filled: Volume = execution.trades.iter().map(|t| t.executed_volume).sum();
            prop_assert_eq!(filled, volume(take.min(available)));
        }
    }
}
