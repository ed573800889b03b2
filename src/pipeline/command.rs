// ============================================================================
// Input Commands
// Order placement and cancellation requests, validated at admission
// ============================================================================

use crate::domain::{CurrencyPair, Order, OrderId, OrderStatus, OrderType, Side, TraderId, UnknownVariant};
use crate::engine::{CancelOutcome, Execution};
use crate::numeric::{NumericError, Price, Volume};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Reasons a command is refused before it reaches the sequencer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported currency pair {0}")]
    UnsupportedCurrencyPair(CurrencyPair),

    #[error("volume must be positive")]
    NonPositiveVolume,

    #[error("limit price must be positive")]
    NonPositivePrice,

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("order {order_id} was already processed ({status:?})")]
    AlreadyProcessed {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("invalid number: {0}")]
    InvalidNumber(#[from] NumericError),

    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),
}

// ============================================================================
// Place Order
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub currency_pair: CurrencyPair,
    pub order_type: OrderType,
    pub side: Side,
    pub volume: Volume,
    /// Ignored for market orders
    pub price: Price,
    pub trader_id: TraderId,
}

impl PlaceOrder {
    pub fn limit(
        order_id: impl Into<OrderId>,
        trader_id: impl Into<TraderId>,
        currency_pair: impl Into<CurrencyPair>,
        side: Side,
        price: Price,
        volume: Volume,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            currency_pair: currency_pair.into(),
            order_type: OrderType::Limit,
            side,
            volume,
            price,
            trader_id: trader_id.into(),
        }
    }

    pub fn market(
        order_id: impl Into<OrderId>,
        trader_id: impl Into<TraderId>,
        currency_pair: impl Into<CurrencyPair>,
        side: Side,
        volume: Volume,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            currency_pair: currency_pair.into(),
            order_type: OrderType::Market,
            side,
            volume,
            price: Price::ZERO,
            trader_id: trader_id.into(),
        }
    }

    /// Build a command from untyped request fields.
    ///
    /// # Errors
    /// Unknown order type or side, unparsable or negative numbers.
    pub fn parse(
        order_id: &str,
        currency_pair: &str,
        order_type: &str,
        side: &str,
        volume: &str,
        price: &str,
        trader_id: &str,
    ) -> Result<Self, ValidationError> {
        let order_type: OrderType = order_type.parse()?;
        let price = match order_type {
            OrderType::Limit => price.parse::<Price>()?,
            OrderType::Market => Price::ZERO,
        };

        Ok(Self {
            order_id: OrderId::new(order_id.trim()),
            currency_pair: CurrencyPair::new(currency_pair.trim()),
            order_type,
            side: side.parse()?,
            volume: volume.parse()?,
            price,
            trader_id: TraderId::new(trader_id.trim()),
        })
    }

    /// Checks that need no knowledge of the exchange
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_id.as_str().is_empty() {
            return Err(ValidationError::EmptyField("order id"));
        }
        if self.trader_id.as_str().is_empty() {
            return Err(ValidationError::EmptyField("trader id"));
        }
        if self.volume.is_zero() {
            return Err(ValidationError::NonPositiveVolume);
        }
        if self.order_type == OrderType::Limit && !self.price.is_positive() {
            return Err(ValidationError::NonPositivePrice);
        }
        Ok(())
    }

    pub fn into_order(self) -> Order {
        Order::new(
            self.order_id,
            self.trader_id,
            self.currency_pair,
            self.side,
            self.order_type,
            self.price,
            self.volume,
        )
    }
}

// ============================================================================
// Cancel Order
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub currency_pair: CurrencyPair,
}

impl CancelOrder {
    pub fn new(
        order_id: impl Into<OrderId>,
        trader_id: impl Into<TraderId>,
        currency_pair: impl Into<CurrencyPair>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            trader_id: trader_id.into(),
            currency_pair: currency_pair.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_id.as_str().is_empty() {
            return Err(ValidationError::EmptyField("order id"));
        }
        if self.trader_id.as_str().is_empty() {
            return Err(ValidationError::EmptyField("trader id"));
        }
        Ok(())
    }
}

// ============================================================================
// Command
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Place(PlaceOrder),
    Cancel(CancelOrder),
}

impl Command {
    pub fn currency_pair(&self) -> &CurrencyPair {
        match self {
            Command::Place(place) => &place.currency_pair,
            Command::Cancel(cancel) => &cancel.currency_pair,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            Command::Place(place) => &place.order_id,
            Command::Cancel(cancel) => &cancel.order_id,
        }
    }

    /// Full admission check against the set of traded pairs
    pub fn validate(&self, supported: &HashSet<CurrencyPair>) -> Result<(), ValidationError> {
        if !supported.contains(self.currency_pair()) {
            return Err(ValidationError::UnsupportedCurrencyPair(
                self.currency_pair().clone(),
            ));
        }
        match self {
            Command::Place(place) => place.validate(),
            Command::Cancel(cancel) => cancel.validate(),
        }
    }
}

impl From<PlaceOrder> for Command {
    fn from(place: PlaceOrder) -> Self {
        Command::Place(place)
    }
}

impl From<CancelOrder> for Command {
    fn from(cancel: CancelOrder) -> Self {
        Command::Cancel(cancel)
    }
}

/// What the exchange did with a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Placed(Execution),
    Cancel(CancelOutcome),
}

impl CommandOutcome {
    pub fn execution(&self) -> Option<&Execution> {
        match self {
            CommandOutcome::Placed(execution) => Some(execution),
            CommandOutcome::Cancel(_) => None,
        }
    }

    pub fn cancel_outcome(&self) -> Option<&CancelOutcome> {
        match self {
            CommandOutcome::Placed(_) => None,
            CommandOutcome::Cancel(outcome) => Some(outcome),
        }
    }
}
