// ============================================================================
// Trade Domain Model
// ============================================================================

use super::ids::{CurrencyPair, TradeId};
use super::order::{OrderSnapshot, Side};
use crate::numeric::{NumericResult, Price, Volume};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single execution between an aggressor and a resting order.
///
/// The order snapshots are taken right after the fill, so `buy_order` and
/// `sell_order` already carry the post-trade open quantity and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade identifier
    pub trade_id: TradeId,

    pub currency_pair: CurrencyPair,

    /// Always the resting order's price
    pub execution_price: Price,

    pub executed_volume: Volume,

    pub execution_time: DateTime<Utc>,

    /// Side of the incoming order that initiated the match
    pub aggressor_side: Side,

    pub buy_order: OrderSnapshot,

    pub sell_order: OrderSnapshot,
}

impl Trade {
    pub fn new(
        currency_pair: CurrencyPair,
        execution_price: Price,
        executed_volume: Volume,
        aggressor_side: Side,
        buy_order: OrderSnapshot,
        sell_order: OrderSnapshot,
    ) -> Self {
        Self {
            trade_id: TradeId::generate(),
            currency_pair,
            execution_price,
            executed_volume,
            execution_time: Utc::now(),
            aggressor_side,
            buy_order,
            sell_order,
        }
    }

    /// Calculate the notional value of the trade (price * volume)
    ///
    /// Returns a Result because multiplication can overflow.
    pub fn notional_value(&self) -> NumericResult<Decimal> {
        self.execution_price.checked_notional(self.executed_volume)
    }

    /// Snapshot of the resting (maker) side
    pub fn resting_order(&self) -> &OrderSnapshot {
        match self.aggressor_side {
            Side::Buy => &self.sell_order,
            Side::Sell => &self.buy_order,
        }
    }

    /// Snapshot of the incoming (taker) side
    pub fn aggressor_order(&self) -> &OrderSnapshot {
        match self.aggressor_side {
            Side::Buy => &self.buy_order,
            Side::Sell => &self.sell_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Order;
    use rust_decimal_macros::dec;

    fn snapshot(id: &str, side: Side) -> OrderSnapshot {
        let mut order = Order::limit(
            id,
            "1234",
            "BTCUSD",
            side,
            Price::new(dec!(100.5)).unwrap(),
            Volume::from_integer(2).unwrap(),
        );
        order.accept().unwrap();
        order.snapshot()
    }

    #[test]
    fn test_trade_creation() {
        let trade = Trade::new(
            CurrencyPair::new("BTCUSD"),
            Price::new(dec!(100.5)).unwrap(),
            Volume::from_integer(2).unwrap(),
            Side::Sell,
            snapshot("b", Side::Buy),
            snapshot("s", Side::Sell),
        );

        assert_eq!(trade.currency_pair.as_str(), "BTCUSD");
        assert_eq!(trade.notional_value().unwrap(), dec!(201));
        assert_eq!(trade.resting_order().order_id.as_str(), "b");
        assert_eq!(trade.aggressor_order().order_id.as_str(), "s");
    }
}
