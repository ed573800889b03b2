// ============================================================================
// Market Data Value Objects
// Depth levels, depth snapshots and best bid/offer
// ============================================================================

use super::ids::CurrencyPair;
use crate::numeric::{Price, Volume};
use serde::{Deserialize, Serialize};

/// Aggregate view of one price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    /// Sum of the open quantity of every order at this price
    pub volume: Volume,
    pub order_count: usize,
}

impl DepthLevel {
    pub fn new(price: Price, volume: Volume, order_count: usize) -> Self {
        Self {
            price,
            volume,
            order_count,
        }
    }
}

/// Top `size` levels of each side, best price first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth {
    pub currency_pair: CurrencyPair,
    pub size: usize,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl Depth {
    pub fn empty(currency_pair: CurrencyPair, size: usize) -> Self {
        Self {
            currency_pair,
            size,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    pub fn total_bid_volume(&self) -> Volume {
        self.bids.iter().map(|level| level.volume).sum()
    }

    pub fn total_ask_volume(&self) -> Volume {
        self.asks.iter().map(|level| level.volume).sum()
    }
}

/// Best bid and offer; a side is `None` when it has no resting orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    pub currency_pair: CurrencyPair,
    pub best_bid: Option<DepthLevel>,
    pub best_ask: Option<DepthLevel>,
}

impl Bbo {
    pub fn empty(currency_pair: CurrencyPair) -> Self {
        Self {
            currency_pair,
            best_bid: None,
            best_ask: None,
        }
    }

    /// Ask minus bid when both sides are present
    pub fn spread(&self) -> Option<rust_decimal::Decimal> {
        match (&self.best_bid, &self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask.price.value() - bid.price.value()),
            _ => None,
        }
    }
}
