// ============================================================================
// Limit Order Book Domain Model
// ============================================================================

use super::depth::{Bbo, Depth, DepthLevel};
use super::ids::{CurrencyPair, OrderId};
use super::order::{Order, OrderError, OrderSnapshot, OrderStatus, OrderType, Side};
use crate::numeric::{NumericError, Price, Volume};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookError {
    #[error("market order {0} cannot rest in the book")]
    MarketOrderNotAllowed(OrderId),

    #[error("order {0} has no open quantity")]
    NoOpenQuantity(OrderId),

    #[error("order {order_id} is not live ({status:?})")]
    NotLive {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("order {order_id} has non-positive limit price {price}")]
    InvalidPrice { order_id: OrderId, price: Price },

    #[error("order {order_id} is for {actual}, book is {expected}")]
    WrongCurrencyPair {
        order_id: OrderId,
        expected: CurrencyPair,
        actual: CurrencyPair,
    },

    #[error("order {0} already in book")]
    DuplicateOrder(OrderId),

    #[error("order {order_id} is on the {actual} side, expected {expected}")]
    WrongSide {
        order_id: OrderId,
        expected: Side,
        actual: Side,
    },

    #[error("no resting liquidity on the {0} side")]
    EmptySide(Side),

    #[error("price level {0} has no orders")]
    EmptyLevel(Price),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

// ============================================================================
// Price Level
// ============================================================================

/// Resting orders at one price in arrival order, with a cached aggregate of
/// their open quantity.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<Order>,
    volume: Volume,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            volume: Volume::ZERO,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    /// Sum of the open quantity of every order at this level
    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Oldest order at this level
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Orders in time priority
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn depth_level(&self) -> DepthLevel {
        DepthLevel::new(self.price, self.volume, self.orders.len())
    }

    fn push_back(&mut self, order: Order) -> Result<(), BookError> {
        self.volume = self.volume.checked_add(order.open_quantity())?;
        self.orders.push_back(order);
        Ok(())
    }

    fn remove(&mut self, order_id: &OrderId) -> Result<Option<Order>, BookError> {
        let Some(position) = self.orders.iter().position(|o| &o.id == order_id) else {
            return Ok(None);
        };
        let open = self.orders[position].open_quantity();
        self.volume = self.volume.checked_sub(open)?;
        Ok(self.orders.remove(position))
    }
}

// ============================================================================
// Book Side
// ============================================================================

/// One side of the book: price levels keyed by price plus an order-id index.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
    index: HashMap<OrderId, Price>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Get the best price level
    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            // Highest bid (last in sorted order)
            Side::Buy => self.levels.values().next_back(),
            // Lowest ask (first in sorted order)
            Side::Sell => self.levels.values().next(),
        }
    }

    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(PriceLevel::price)
    }

    /// Price levels, best first
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// Resting orders in strict price-time priority
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.levels().flat_map(|level| level.orders())
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let price = self.index.get(order_id)?;
        self.levels.get(price)?.orders().find(|o| &o.id == order_id)
    }

    /// Get depth at N levels
    pub fn depth(&self, num_levels: usize) -> Vec<DepthLevel> {
        self.levels()
            .take(num_levels)
            .map(PriceLevel::depth_level)
            .collect()
    }

    /// Append a limit order at the tail of its price level.
    fn insert(&mut self, order: Order) -> Result<(), BookError> {
        if order.side != self.side {
            return Err(BookError::WrongSide {
                order_id: order.id.clone(),
                expected: self.side,
                actual: order.side,
            });
        }
        if self.index.contains_key(&order.id) {
            return Err(BookError::DuplicateOrder(order.id.clone()));
        }

        let price = order.price;
        let order_id = order.id.clone();
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(order)?;
        self.index.insert(order_id, price);
        Ok(())
    }

    fn remove(&mut self, order_id: &OrderId) -> Result<Option<Order>, BookError> {
        let Some(price) = self.index.get(order_id).copied() else {
            return Ok(None);
        };
        let Some(level) = self.levels.get_mut(&price) else {
            return Ok(None);
        };

        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        if removed.is_some() {
            self.index.remove(order_id);
        }
        Ok(removed)
    }

    /// Fill the oldest order at the best level by `volume`.
    ///
    /// The order leaves the book once its open quantity reaches zero, and the
    /// level goes with it when emptied. Returns the order's post-fill state.
    pub(crate) fn fill_best(&mut self, volume: Volume) -> Result<OrderSnapshot, BookError> {
        let price = self.best_price().ok_or(BookError::EmptySide(self.side))?;
        let level = self
            .levels
            .get_mut(&price)
            .ok_or(BookError::EmptyLevel(price))?;
        let order = level
            .orders
            .front_mut()
            .ok_or(BookError::EmptyLevel(price))?;

        order.fill(volume)?;
        let snapshot = order.snapshot();
        level.volume = level.volume.checked_sub(volume)?;

        if snapshot.open_quantity.is_zero() {
            level.orders.pop_front();
            self.index.remove(&snapshot.order_id);
        }
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Ok(snapshot)
    }
}

// ============================================================================
// Limit Order Book
// ============================================================================

/// Resting limit orders for one currency pair.
///
/// Mutated only by the matching engine that owns it; never locked.
#[derive(Debug, Clone)]
pub struct LimitOrderBook {
    currency_pair: CurrencyPair,
    bids: BookSide,
    asks: BookSide,
}

impl LimitOrderBook {
    pub fn new(currency_pair: CurrencyPair) -> Self {
        Self {
            currency_pair,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
        }
    }

    /// Rebuild a book from a published snapshot, preserving queue order.
    pub fn restore(snapshot: &LimitOrderBookSnapshot) -> Result<Self, BookError> {
        let mut book = Self::new(snapshot.currency_pair.clone());
        for order in snapshot.bids.iter().chain(snapshot.asks.iter()) {
            book.place_order(Order::from_snapshot(order))?;
        }
        Ok(book)
    }

    pub fn currency_pair(&self) -> &CurrencyPair {
        &self.currency_pair
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Insert a live limit order at the tail of its price level.
    ///
    /// # Errors
    /// Market orders, orders with nothing left to fill, orders that are not
    /// live, orders for another pair and duplicate ids are rejected.
    pub fn place_order(&mut self, order: Order) -> Result<(), BookError> {
        if order.order_type == OrderType::Market {
            return Err(BookError::MarketOrderNotAllowed(order.id));
        }
        if order.open_quantity().is_zero() {
            return Err(BookError::NoOpenQuantity(order.id));
        }
        if !order.status().can_be_cancelled() {
            return Err(BookError::NotLive {
                status: order.status(),
                order_id: order.id,
            });
        }
        if !order.price.is_positive() {
            return Err(BookError::InvalidPrice {
                price: order.price,
                order_id: order.id,
            });
        }
        if order.currency_pair != self.currency_pair {
            return Err(BookError::WrongCurrencyPair {
                order_id: order.id,
                expected: self.currency_pair.clone(),
                actual: order.currency_pair,
            });
        }
        if self.contains(&order.id) {
            return Err(BookError::DuplicateOrder(order.id));
        }

        self.side_mut(order.side).insert(order)
    }

    /// Remove a resting order. `Ok(None)` means it was not in the book.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Option<Order>, BookError> {
        if let Some(order) = self.bids.remove(order_id)? {
            return Ok(Some(order));
        }
        self.asks.remove(order_id)
    }

    /// Best level of `side`, if any
    pub fn peek_best(&self, side: Side) -> Option<&PriceLevel> {
        self.side(side).best_level()
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// True when the best bid is at or above the best ask
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid_price(), self.best_ask_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.bids.contains(order_id) || self.asks.contains(order_id)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.bids.get(order_id).or_else(|| self.asks.get(order_id))
    }

    pub fn bid_count(&self) -> usize {
        self.bids.order_count()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.order_count()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.level_count()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.level_count()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn bbo(&self) -> Bbo {
        Bbo {
            currency_pair: self.currency_pair.clone(),
            best_bid: self.bids.best_level().map(PriceLevel::depth_level),
            best_ask: self.asks.best_level().map(PriceLevel::depth_level),
        }
    }

    pub fn depth(&self, size: usize) -> Depth {
        Depth {
            currency_pair: self.currency_pair.clone(),
            size,
            bids: self.bids.depth(size),
            asks: self.asks.depth(size),
        }
    }

    pub fn snapshot(&self) -> LimitOrderBookSnapshot {
        LimitOrderBookSnapshot {
            currency_pair: self.currency_pair.clone(),
            bids: self.bids.orders().map(Order::snapshot).collect(),
            asks: self.asks.orders().map(Order::snapshot).collect(),
        }
    }
}

// ============================================================================
// Limit Order Book Snapshot
// ============================================================================

/// Every resting order of a book, each side in price-time priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderBookSnapshot {
    pub currency_pair: CurrencyPair,
    pub bids: Vec<OrderSnapshot>,
    pub asks: Vec<OrderSnapshot>,
}

impl LimitOrderBookSnapshot {
    pub fn empty(currency_pair: CurrencyPair) -> Self {
        Self {
            currency_pair,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}
