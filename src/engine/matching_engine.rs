// ============================================================================
// Matching Engine
// Core business logic for order matching, one instance per currency pair
// ============================================================================

use super::MatchingError;
use crate::domain::{
    Bbo, CurrencyPair, Depth, LimitOrderBook, Order, OrderId, OrderSnapshot, OrderStatus, OrderType,
    Trade, TraderId,
};
use crate::interfaces::{EventBatch, MatchingAlgorithm, OutputEvent};
use crate::pipeline::ValidationError;

/// Result of placing an order
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Final state of the incoming order
    pub order: OrderSnapshot,
    /// Trades in match order
    pub trades: Vec<Trade>,
}

impl Execution {
    /// True when a remainder was left resting in the book
    pub fn rested(&self) -> bool {
        self.order.order_type == OrderType::Limit && !self.order.status.is_terminal()
    }
}

/// Result of a cancellation request. Neither failure case is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The order left the book; its final state
    Cancelled(OrderSnapshot),
    /// Unknown id, or the order already filled or cancelled
    NotFound,
    /// The order rests in the book but belongs to another trader
    NotOwned,
}

impl CancelOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelOutcome::Cancelled(_))
    }
}

/// What a command produced: the caller's outcome and the events to publish
#[derive(Debug)]
pub struct Processed<T> {
    pub outcome: T,
    pub events: EventBatch,
}

/// Single-writer matching engine for one currency pair
///
/// Owns its book outright. Every mutation goes through [`place_order`] or
/// [`cancel_order`], which return the events describing the change.
///
/// [`place_order`]: MatchingEngine::place_order
/// [`cancel_order`]: MatchingEngine::cancel_order
pub struct MatchingEngine {
    /// Trading pair (e.g., "BTCUSD")
    currency_pair: CurrencyPair,

    book: LimitOrderBook,

    /// Pluggable matching algorithm
    algorithm: Box<dyn MatchingAlgorithm>,

    /// Levels per side in published depth
    depth_levels: usize,

    /// Last published market data, to emit only changes
    last_depth: Depth,
    last_bbo: Bbo,

    halted: bool,
}

impl MatchingEngine {
    /// Create a new matching engine
    pub fn new(
        currency_pair: CurrencyPair,
        algorithm: Box<dyn MatchingAlgorithm>,
        depth_levels: usize,
    ) -> Self {
        Self::with_book(LimitOrderBook::new(currency_pair), algorithm, depth_levels)
    }

    /// Create an engine around an existing (restored) book
    pub fn with_book(
        book: LimitOrderBook,
        algorithm: Box<dyn MatchingAlgorithm>,
        depth_levels: usize,
    ) -> Self {
        let currency_pair = book.currency_pair().clone();
        let last_depth = book.depth(depth_levels);
        let last_bbo = book.bbo();

        Self {
            currency_pair,
            book,
            algorithm,
            depth_levels,
            last_depth,
            last_bbo,
            halted: false,
        }
    }

    pub fn currency_pair(&self) -> &CurrencyPair {
        &self.currency_pair
    }

    pub fn book(&self) -> &LimitOrderBook {
        &self.book
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Match an incoming order and rest any limit remainder.
    ///
    /// Events, in order: trades, updates of the touched resting orders,
    /// update of the incoming order, then book snapshot, depth and BBO when
    /// they changed.
    pub fn place_order(&mut self, order: Order) -> Result<Processed<Execution>, MatchingError> {
        self.ensure_running()?;
        let order_id = order.id.clone();
        let result = self.place_inner(order);
        self.halt_on_violation(&result, &order_id);
        result
    }

    /// Cancel a resting order owned by `trader_id`.
    pub fn cancel_order(
        &mut self,
        order_id: &OrderId,
        trader_id: &TraderId,
    ) -> Result<Processed<CancelOutcome>, MatchingError> {
        self.ensure_running()?;
        let result = self.cancel_inner(order_id, trader_id);
        self.halt_on_violation(&result, order_id);
        result
    }

    /// Basic order checks before anything touches the book
    pub fn validate_order(&self, order: &Order) -> Result<(), ValidationError> {
        if order.currency_pair != self.currency_pair {
            return Err(ValidationError::UnsupportedCurrencyPair(
                order.currency_pair.clone(),
            ));
        }
        if order.status() != OrderStatus::New {
            return Err(ValidationError::AlreadyProcessed {
                order_id: order.id.clone(),
                status: order.status(),
            });
        }
        if order.open_quantity().is_zero() {
            return Err(ValidationError::NonPositiveVolume);
        }
        if order.is_limit_order() && !order.price.is_positive() {
            return Err(ValidationError::NonPositivePrice);
        }
        Ok(())
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn place_inner(&mut self, mut order: Order) -> Result<Processed<Execution>, MatchingError> {
        self.validate_order(&order)?;
        if self.book.contains(&order.id) {
            return Err(MatchingError::DuplicateOrderId(order.id));
        }

        order.accept()?;

        // Match against the opposite side
        let opposite = self.book.side_mut(order.side.opposite());
        let trades = self.algorithm.match_order(&mut order, opposite)?;

        let mut events = EventBatch::new();
        events.extend(trades.iter().cloned().map(OutputEvent::Trade));
        events.extend(
            trades
                .iter()
                .map(|trade| OutputEvent::OrderUpdated(trade.resting_order().clone())),
        );

        let mut rests = false;
        if !order.open_quantity().is_zero() {
            match order.order_type {
                OrderType::Limit => rests = true,
                // Market orders never rest
                OrderType::Market => order.cancel()?,
            }
        }

        let snapshot = order.snapshot();
        if rests {
            self.book.place_order(order)?;
        }
        events.push(OutputEvent::OrderUpdated(snapshot.clone()));

        if rests || !trades.is_empty() {
            self.publish_book_state(&mut events)?;
        }

        tracing::debug!(
            currency_pair = %self.currency_pair,
            order_id = %snapshot.order_id,
            status = ?snapshot.status,
            trades = trades.len(),
            "Order processed"
        );

        Ok(Processed {
            outcome: Execution {
                order: snapshot,
                trades,
            },
            events,
        })
    }

    fn cancel_inner(
        &mut self,
        order_id: &OrderId,
        trader_id: &TraderId,
    ) -> Result<Processed<CancelOutcome>, MatchingError> {
        let outcome = match self.book.get(order_id) {
            None => CancelOutcome::NotFound,
            Some(resting) if &resting.trader_id != trader_id => CancelOutcome::NotOwned,
            Some(_) => match self.book.remove_order(order_id)? {
                Some(mut order) => {
                    order.cancel()?;
                    CancelOutcome::Cancelled(order.snapshot())
                }
                None => CancelOutcome::NotFound,
            },
        };

        let mut events = EventBatch::new();
        match &outcome {
            CancelOutcome::Cancelled(snapshot) => {
                events.push(OutputEvent::OrderUpdated(snapshot.clone()));
                self.publish_book_state(&mut events)?;
                tracing::debug!(
                    currency_pair = %self.currency_pair,
                    order_id = %order_id,
                    "Order cancelled"
                );
            }
            other => {
                tracing::debug!(
                    currency_pair = %self.currency_pair,
                    order_id = %order_id,
                    trader_id = %trader_id,
                    outcome = ?other,
                    "Cancel had no effect"
                );
            }
        }

        Ok(Processed { outcome, events })
    }

    /// Append the book snapshot plus depth and BBO when they changed.
    fn publish_book_state(&mut self, events: &mut EventBatch) -> Result<(), MatchingError> {
        if let (Some(bid), Some(ask)) = (self.book.best_bid_price(), self.book.best_ask_price()) {
            if bid >= ask {
                return Err(MatchingError::CrossedBook { bid, ask });
            }
        }

        events.push(OutputEvent::LimitOrderBook(self.book.snapshot()));

        let depth = self.book.depth(self.depth_levels);
        if depth != self.last_depth {
            self.last_depth = depth.clone();
            events.push(OutputEvent::Depth(depth));
        }

        let bbo = self.book.bbo();
        if bbo != self.last_bbo {
            self.last_bbo = bbo.clone();
            events.push(OutputEvent::Bbo(bbo));
        }

        Ok(())
    }

    fn ensure_running(&self) -> Result<(), MatchingError> {
        if self.halted {
            return Err(MatchingError::Halted(self.currency_pair.clone()));
        }
        Ok(())
    }

    fn halt_on_violation<T>(&mut self, result: &Result<T, MatchingError>, order_id: &OrderId) {
        if let Err(error) = result {
            if error.is_invariant_violation() {
                self.halted = true;
                tracing::error!(
                    currency_pair = %self.currency_pair,
                    order_id = %order_id,
                    %error,
                    "Invariant violated, matching engine halted"
                );
            }
        }
    }
}
