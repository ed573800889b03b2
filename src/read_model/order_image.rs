// ============================================================================
// Order Memory Image
// Per-order and per-trader view built from order updates and trades
// ============================================================================

use crate::domain::{
    CurrencyPair, OrderId, OrderSnapshot, OrderStatus, OrderType, Side, Trade, TradeId, TraderId,
};
use crate::interfaces::{EventSubscriber, OutputEvent, SequencedEvent, SubscriberError};
use crate::numeric::{NumericError, NumericResult, Price, Volume};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-side view of one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRepresentation {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub side: Side,
    pub price: Price,
    pub volume: Volume,
    pub volume_executed: Volume,
    pub open_quantity: Volume,
    pub status: OrderStatus,
    pub trader_id: TraderId,
    pub currency_pair: CurrencyPair,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Volume-weighted execution price; zero until the first trade
    pub average_price: Decimal,
    pub trade_ids: Vec<TradeId>,
}

impl OrderRepresentation {
    fn from_snapshot(order: &OrderSnapshot) -> Self {
        Self {
            order_id: order.order_id.clone(),
            order_type: order.order_type,
            side: order.side,
            price: order.price,
            volume: order.volume,
            volume_executed: order.volume_executed,
            open_quantity: order.open_quantity,
            status: order.status,
            trader_id: order.trader_id.clone(),
            currency_pair: order.currency_pair.clone(),
            created_at: order.created_at,
            closed_at: order.closed_at,
            average_price: Decimal::ZERO,
            trade_ids: Vec::new(),
        }
    }

    fn update(&mut self, order: &OrderSnapshot) {
        self.volume_executed = order.volume_executed;
        self.open_quantity = order.open_quantity;
        self.status = order.status;
        self.closed_at = order.closed_at;
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// One trade as seen by one of its two traders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRepresentation {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub currency_pair: CurrencyPair,
    /// The trader's own side
    pub side: Side,
    pub price: Price,
    pub volume: Volume,
    pub execution_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct OrderImageState {
    orders: HashMap<OrderId, OrderRepresentation>,
    /// Executed notional per order, for the average price
    notional: HashMap<OrderId, Decimal>,
    /// Order ids per trader, in first-seen order
    by_trader: HashMap<TraderId, Vec<OrderId>>,
    trades: HashMap<TraderId, Vec<TradeRepresentation>>,
}

impl OrderImageState {
    fn upsert(&mut self, order: &OrderSnapshot) -> &mut OrderRepresentation {
        if !self.orders.contains_key(&order.order_id) {
            self.by_trader
                .entry(order.trader_id.clone())
                .or_default()
                .push(order.order_id.clone());
        }

        let representation = self
            .orders
            .entry(order.order_id.clone())
            .or_insert_with(|| OrderRepresentation::from_snapshot(order));
        representation.update(order);
        representation
    }

    fn apply_trade(&mut self, trade: &Trade) {
        for order in [&trade.buy_order, &trade.sell_order] {
            let total = self.add_notional(&order.order_id, trade);

            let representation = self.upsert(order);
            representation.trade_ids.push(trade.trade_id.clone());
            let executed = representation.volume_executed.value();
            let average = total.and_then(|total| {
                if executed.is_zero() {
                    Ok(representation.average_price)
                } else {
                    total.checked_div(executed).ok_or(NumericError::Overflow)
                }
            });
            match average {
                Ok(average) => representation.average_price = average,
                Err(error) => tracing::warn!(
                    trade_id = %trade.trade_id,
                    order_id = %order.order_id,
                    %error,
                    "Average price not updated"
                ),
            }

            self.trades
                .entry(order.trader_id.clone())
                .or_default()
                .push(TradeRepresentation {
                    trade_id: trade.trade_id.clone(),
                    order_id: order.order_id.clone(),
                    currency_pair: trade.currency_pair.clone(),
                    side: order.side,
                    price: trade.execution_price,
                    volume: trade.executed_volume,
                    execution_time: trade.execution_time,
                });
        }
    }

    /// Executed notional of an order including `trade`; unchanged on overflow
    fn add_notional(&mut self, order_id: &OrderId, trade: &Trade) -> NumericResult<Decimal> {
        let current = self.notional.get(order_id).copied().unwrap_or_default();
        let total = current
            .checked_add(trade.notional_value()?)
            .ok_or(NumericError::Overflow)?;
        self.notional.insert(order_id.clone(), total);
        Ok(total)
    }

    fn orders_of(&self, trader_id: &TraderId, open: bool) -> Vec<OrderRepresentation> {
        self.by_trader
            .get(trader_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.orders.get(id))
            .filter(|order| order.is_open() == open)
            .cloned()
            .collect()
    }
}

/// Orders and trades of every trader.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct OrderMemoryImage {
    state: Arc<RwLock<OrderImageState>>,
}

impl OrderMemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self, order_id: &OrderId) -> Option<OrderRepresentation> {
        self.state.read().orders.get(order_id).cloned()
    }

    /// Orders still in the book, oldest first
    pub fn open_orders(&self, trader_id: &TraderId) -> Vec<OrderRepresentation> {
        self.state.read().orders_of(trader_id, true)
    }

    /// Filled and cancelled orders, oldest first
    pub fn closed_orders(&self, trader_id: &TraderId) -> Vec<OrderRepresentation> {
        self.state.read().orders_of(trader_id, false)
    }

    pub fn trades(&self, trader_id: &TraderId) -> Vec<TradeRepresentation> {
        self.state
            .read()
            .trades
            .get(trader_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn order_count(&self) -> usize {
        self.state.read().orders.len()
    }

    pub fn apply(&self, event: &OutputEvent) {
        match event {
            OutputEvent::OrderUpdated(order) => {
                self.state.write().upsert(order);
            }
            OutputEvent::Trade(trade) => self.state.write().apply_trade(trade),
            OutputEvent::Depth(_) | OutputEvent::Bbo(_) | OutputEvent::LimitOrderBook(_) => {}
        }
    }
}

impl EventSubscriber for OrderMemoryImage {
    fn name(&self) -> &str {
        "order-image"
    }

    fn on_event(&mut self, event: &SequencedEvent) -> Result<(), SubscriberError> {
        self.apply(&event.event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExchangeConfig;
    use crate::engine::Exchange;
    use crate::interfaces::CollectingEventHandler;
    use crate::pipeline::{CancelOrder, PlaceOrder};
    use rust_decimal_macros::dec;

    fn run(commands: Vec<crate::pipeline::Command>) -> OrderMemoryImage {
        let events = Arc::new(CollectingEventHandler::new());
        let mut exchange = Exchange::new(&ExchangeConfig::coin_exchange(), events.clone()).unwrap();
        for command in commands {
            exchange.execute(command).unwrap();
        }

        let image = OrderMemoryImage::new();
        for event in events.drain() {
            image.apply(&event);
        }
        image
    }

    fn limit(id: &str, trader: &str, side: Side, price: i64, volume: i64) -> crate::pipeline::Command {
        PlaceOrder::limit(
            id,
            trader,
            "BTCUSD",
            side,
            Price::from_integer(price).unwrap(),
            Volume::from_integer(volume).unwrap(),
        )
        .into()
    }

    #[test]
    fn test_open_and_closed_orders() {
        let image = run(vec![
            limit("1", "alice", Side::Buy, 10, 5),
            limit("2", "alice", Side::Buy, 9, 5),
            CancelOrder::new("2", "alice", "BTCUSD").into(),
            limit("3", "bob", Side::Sell, 10, 5),
        ]);

        let alice: TraderId = "alice".into();
        assert!(image.open_orders(&alice).is_empty());
        let closed = image.closed_orders(&alice);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].status, OrderStatus::Filled);
        assert_eq!(closed[1].status, OrderStatus::Cancelled);
        assert!(closed[1].closed_at.is_some());
    }

    #[test]
    fn test_average_price_across_trades() {
        let image = run(vec![
            limit("1", "alice", Side::Sell, 10, 2),
            limit("2", "alice", Side::Sell, 13, 2),
            limit("3", "bob", Side::Buy, 13, 3),
        ]);

        let taker = image.order(&"3".into()).unwrap();
        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(taker.trade_ids.len(), 2);
        // (2 * 10 + 1 * 13) / 3
        assert_eq!(taker.average_price, dec!(33) / dec!(3));

        let maker = image.order(&"2".into()).unwrap();
        assert_eq!(maker.status, OrderStatus::PartiallyFilled);
        assert_eq!(maker.average_price, dec!(13));
        assert_eq!(image.open_orders(&"alice".into()).len(), 1);
    }

    #[test]
    fn test_trades_per_trader() {
        let image = run(vec![
            limit("1", "alice", Side::Sell, 10, 2),
            limit("2", "bob", Side::Buy, 10, 2),
        ]);

        let alice = image.trades(&"alice".into());
        let bob = image.trades(&"bob".into());
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
        assert_eq!(alice[0].trade_id, bob[0].trade_id);
        assert_eq!(alice[0].side, Side::Sell);
        assert_eq!(bob[0].side, Side::Buy);
        assert!(image.trades(&"carol".into()).is_empty());
    }

    #[test]
    fn test_notional_overflow_keeps_last_average() {
        let huge = Price::new(Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0)).unwrap();
        let place = |id: &str, trader: &str, side: Side, volume: i64| -> crate::pipeline::Command {
            PlaceOrder::limit(id, trader, "BTCUSD", side, huge, Volume::from_integer(volume).unwrap()).into()
        };
        let image = run(vec![
            place("1", "alice", Side::Sell, 2),
            place("2", "bob", Side::Buy, 1),
            place("3", "bob", Side::Buy, 1),
        ]);

        let maker = image.order(&"1".into()).unwrap();
        assert_eq!(maker.status, OrderStatus::Filled);
        assert_eq!(maker.trade_ids.len(), 2);
        assert_eq!(maker.average_price, huge.value());

        // Each taker saw a single trade that fits
        assert_eq!(image.order(&"3".into()).unwrap().average_price, huge.value());
        assert_eq!(image.trades(&"alice".into()).len(), 2);
    }
}
