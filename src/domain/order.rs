// ============================================================================
// Order Domain Model
// ============================================================================

use super::ids::{CurrencyPair, OrderId, TraderId};
use crate::numeric::{NumericError, Price, Volume};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use state::{OrderStatus, OrderStatusTransition};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Rests in the book when not fully matched
    Limit,
    /// Matches against whatever liquidity exists; the remainder is cancelled
    Market,
}

/// A side or order type string that is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Side {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(UnknownVariant {
                kind: "order side",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for OrderType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "limit" => Ok(OrderType::Limit),
            "market" => Ok(OrderType::Market),
            _ => Err(UnknownVariant {
                kind: "order type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        })
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        })
    }
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    use super::OrderError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum OrderStatus {
        New,
        Accepted,
        PartiallyFilled,
        Filled,
        Cancelled,
    }

    impl OrderStatus {
        pub fn is_terminal(&self) -> bool {
            matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
        }

        pub fn can_be_cancelled(&self) -> bool {
            matches!(self, OrderStatus::Accepted | OrderStatus::PartiallyFilled)
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderStatusTransition {
        Accept,
        PartialFill,
        Fill,
        Cancel,
    }

    impl OrderStatus {
        pub fn transition(&self, transition: OrderStatusTransition) -> Result<OrderStatus, OrderError> {
            use OrderStatusTransition as T;

            match (self, transition) {
                (OrderStatus::New, T::Accept) => Ok(OrderStatus::Accepted),

                (OrderStatus::Accepted, T::PartialFill) => Ok(OrderStatus::PartiallyFilled),
                (OrderStatus::Accepted, T::Fill) => Ok(OrderStatus::Filled),
                (OrderStatus::Accepted, T::Cancel) => Ok(OrderStatus::Cancelled),

                (OrderStatus::PartiallyFilled, T::PartialFill) => Ok(OrderStatus::PartiallyFilled),
                (OrderStatus::PartiallyFilled, T::Fill) => Ok(OrderStatus::Filled),
                (OrderStatus::PartiallyFilled, T::Cancel) => Ok(OrderStatus::Cancelled),

                (from, via) => Err(OrderError::InvalidTransition { from: *from, via }),
            }
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("invalid transition from {from:?} via {via:?}")]
    InvalidTransition {
        from: OrderStatus,
        via: OrderStatusTransition,
    },

    #[error("fill of {requested} exceeds open quantity {open} on order {order_id}")]
    Overfill {
        order_id: OrderId,
        requested: Volume,
        open: Volume,
    },

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

// ============================================================================
// Order Entity
// ============================================================================

/// An order as owned by the matching engine.
///
/// Identity fields are public and never change. Fill state is private and only
/// moves through [`Order::fill`] and [`Order::cancel`], which keep
/// `open_quantity + volume_executed == volume` and the status monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub trader_id: TraderId,
    pub currency_pair: CurrencyPair,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; zero for market orders
    pub price: Price,
    /// Original volume
    pub volume: Volume,
    pub created_at: DateTime<Utc>,

    open_quantity: Volume,
    volume_executed: Volume,
    status: OrderStatus,
    closed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        id: OrderId,
        trader_id: TraderId,
        currency_pair: CurrencyPair,
        side: Side,
        order_type: OrderType,
        price: Price,
        volume: Volume,
    ) -> Self {
        let price = match order_type {
            OrderType::Limit => price,
            OrderType::Market => Price::ZERO,
        };

        Self {
            id,
            trader_id,
            currency_pair,
            side,
            order_type,
            price,
            volume,
            created_at: Utc::now(),
            open_quantity: volume,
            volume_executed: Volume::ZERO,
            status: OrderStatus::New,
            closed_at: None,
        }
    }

    /// Shorthand for a limit order
    pub fn limit(
        id: impl Into<OrderId>,
        trader_id: impl Into<TraderId>,
        currency_pair: impl Into<CurrencyPair>,
        side: Side,
        price: Price,
        volume: Volume,
    ) -> Self {
        Self::new(
            id.into(),
            trader_id.into(),
            currency_pair.into(),
            side,
            OrderType::Limit,
            price,
            volume,
        )
    }

    /// Shorthand for a market order
    pub fn market(
        id: impl Into<OrderId>,
        trader_id: impl Into<TraderId>,
        currency_pair: impl Into<CurrencyPair>,
        side: Side,
        volume: Volume,
    ) -> Self {
        Self::new(
            id.into(),
            trader_id.into(),
            currency_pair.into(),
            side,
            OrderType::Market,
            Price::ZERO,
            volume,
        )
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn open_quantity(&self) -> Volume {
        self.open_quantity
    }

    pub fn volume_executed(&self) -> Volume {
        self.volume_executed
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_market_order(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }

    pub fn is_limit_order(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }

    // ========================================================================
    // State Changes
    // ========================================================================

    pub fn accept(&mut self) -> Result<(), OrderError> {
        self.status = self.status.transition(OrderStatusTransition::Accept)?;
        Ok(())
    }

    /// Execute `volume` against this order.
    ///
    /// # Errors
    /// `Overfill` if `volume` exceeds the open quantity, `InvalidTransition`
    /// if the order is not live. The order is left untouched on error.
    pub fn fill(&mut self, volume: Volume) -> Result<(), OrderError> {
        if volume.is_zero() {
            return Ok(());
        }
        if volume > self.open_quantity {
            return Err(OrderError::Overfill {
                order_id: self.id.clone(),
                requested: volume,
                open: self.open_quantity,
            });
        }

        let open_quantity = self.open_quantity.checked_sub(volume)?;
        let volume_executed = self.volume_executed.checked_add(volume)?;
        let status = self.status.transition(if open_quantity.is_zero() {
            OrderStatusTransition::Fill
        } else {
            OrderStatusTransition::PartialFill
        })?;

        self.open_quantity = open_quantity;
        self.volume_executed = volume_executed;
        self.status = status;
        if status.is_terminal() {
            self.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.status = self.status.transition(OrderStatusTransition::Cancel)?;
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// Whether this order, as aggressor, may trade against a resting order at
    /// `resting_price`.
    pub fn crosses(&self, resting_price: Price) -> bool {
        match (self.order_type, self.side) {
            (OrderType::Market, _) => true,
            (OrderType::Limit, Side::Buy) => self.price >= resting_price,
            (OrderType::Limit, Side::Sell) => self.price <= resting_price,
        }
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.id.clone(),
            trader_id: self.trader_id.clone(),
            currency_pair: self.currency_pair.clone(),
            side: self.side,
            order_type: self.order_type,
            price: self.price,
            volume: self.volume,
            open_quantity: self.open_quantity,
            volume_executed: self.volume_executed,
            status: self.status,
            created_at: self.created_at,
            closed_at: self.closed_at,
        }
    }

    /// Rebuild a live order from a published snapshot (journal recovery).
    pub(crate) fn from_snapshot(snapshot: &OrderSnapshot) -> Self {
        Self {
            id: snapshot.order_id.clone(),
            trader_id: snapshot.trader_id.clone(),
            currency_pair: snapshot.currency_pair.clone(),
            side: snapshot.side,
            order_type: snapshot.order_type,
            price: snapshot.price,
            volume: snapshot.volume,
            created_at: snapshot.created_at,
            open_quantity: snapshot.open_quantity,
            volume_executed: snapshot.volume_executed,
            status: snapshot.status,
            closed_at: snapshot.closed_at,
        }
    }
}

// ============================================================================
// Order Snapshot
// ============================================================================

/// Immutable copy of an order's state at the moment an event was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub currency_pair: CurrencyPair,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub volume: Volume,
    pub open_quantity: Volume,
    pub volume_executed: Volume,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_limit(volume: i64) -> Order {
        Order::limit(
            "1",
            "1234",
            "BTCUSD",
            Side::Buy,
            Price::new(dec!(493.34)).unwrap(),
            Volume::from_integer(volume).unwrap(),
        )
    }

    #[test]
    fn test_order_creation() {
        let order = buy_limit(250);

        assert_eq!(order.open_quantity(), Volume::from_integer(250).unwrap());
        assert_eq!(order.volume_executed(), Volume::ZERO);
        assert_eq!(order.status(), OrderStatus::New);
    }

    #[test]
    fn test_market_order_price_is_zero() {
        let order = Order::new(
            OrderId::new("m"),
            TraderId::new("t"),
            CurrencyPair::new("BTCUSD"),
            Side::Sell,
            OrderType::Market,
            Price::from_integer(10).unwrap(),
            Volume::from_integer(5).unwrap(),
        );
        assert!(order.price.is_zero());
        assert!(order.crosses(Price::from_integer(1).unwrap()));
    }

    #[test]
    fn test_fill_lifecycle() {
        let mut order = buy_limit(10);
        order.accept().unwrap();

        order.fill(Volume::from_integer(3).unwrap()).unwrap();
        assert_eq!(order.volume_executed(), Volume::from_integer(3).unwrap());
        assert_eq!(order.open_quantity(), Volume::from_integer(7).unwrap());
        assert_eq!(order.status(), OrderStatus::PartiallyFilled);
        assert!(order.closed_at().is_none());

        order.fill(Volume::from_integer(7).unwrap()).unwrap();
        assert_eq!(order.status(), OrderStatus::Filled);
        assert!(order.closed_at().is_some());
    }

    #[test]
    fn test_overfill_protection() {
        let mut order = buy_limit(5);
        order.accept().unwrap();

        let err = order.fill(Volume::from_integer(10).unwrap()).unwrap_err();
        assert!(matches!(err, OrderError::Overfill { .. }));
        assert_eq!(order.volume_executed(), Volume::ZERO);
        assert_eq!(order.status(), OrderStatus::Accepted);
    }

    #[test]
    fn test_fill_before_accept_is_rejected() {
        let mut order = buy_limit(5);
        assert!(matches!(
            order.fill(Volume::from_integer(1).unwrap()),
            Err(OrderError::InvalidTransition { .. })
        ));
        assert_eq!(order.open_quantity(), Volume::from_integer(5).unwrap());
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let mut order = buy_limit(1);
        order.accept().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);

        assert!(order.cancel().is_err());
        assert!(order.fill(Volume::from_integer(1).unwrap()).is_err());
    }

    #[test]
    fn test_crossing_rules() {
        let buy = buy_limit(1);
        assert!(buy.crosses(Price::new(dec!(493.34)).unwrap()));
        assert!(buy.crosses(Price::new(dec!(490)).unwrap()));
        assert!(!buy.crosses(Price::new(dec!(493.35)).unwrap()));

        let sell = Order::limit(
            "2",
            "1",
            "BTCUSD",
            Side::Sell,
            Price::from_integer(100).unwrap(),
            Volume::from_integer(1).unwrap(),
        );
        assert!(sell.crosses(Price::from_integer(101).unwrap()));
        assert!(!sell.crosses(Price::from_integer(99).unwrap()));
    }

    #[test]
    fn test_parse_side_and_type() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("Market".parse::<OrderType>().unwrap(), OrderType::Market);
        assert!("stop".parse::<OrderType>().is_err());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut order = buy_limit(4);
        order.accept().unwrap();
        order.fill(Volume::from_integer(1).unwrap()).unwrap();

        let restored = Order::from_snapshot(&order.snapshot());
        assert_eq!(restored, order);
    }
}
