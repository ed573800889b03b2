// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// ============================================================================

use super::MatchingError;
use crate::domain::{BookError, BookSide, Order, Side, Trade};
use crate::interfaces::MatchingAlgorithm;

/// Price/Time Priority (FIFO) matching algorithm
///
/// Better prices match first; orders at the same price level are matched in
/// arrival order. Every execution happens at the resting order's price.
///
/// # Example
/// ```text
/// Book:  sell 1.0 @ 50000 (Order A, t=100)
///        sell 2.0 @ 50000 (Order B, t=101)
///
/// Incoming: Buy 1.5 @ 50000
/// Result: Match 1.0 with A, then 0.5 with B (B keeps its place with 1.5 open)
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceTimePriority;

impl PriceTimePriority {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn match_order(
        &self,
        incoming_order: &mut Order,
        opposite_side: &mut BookSide,
    ) -> Result<Vec<Trade>, MatchingError> {
        let mut trades = Vec::new();

        while !incoming_order.open_quantity().is_zero() {
            // Get best price level
            let Some(best_level) = opposite_side.best_level() else {
                break;
            };
            let price = best_level.price();

            // Check if prices cross
            if !self.prices_cross(incoming_order, price) {
                break;
            }

            let maker = best_level
                .front()
                .ok_or(BookError::EmptyLevel(price))?;
            let executed = incoming_order.open_quantity().min(maker.open_quantity());
            if executed.is_zero() {
                return Err(MatchingError::EmptyRestingOrder(maker.id.clone()));
            }

            let maker_after = opposite_side.fill_best(executed)?;
            incoming_order.fill(executed)?;
            let taker_after = incoming_order.snapshot();

            let (buy_order, sell_order) = match incoming_order.side {
                Side::Buy => (taker_after, maker_after),
                Side::Sell => (maker_after, taker_after),
            };

            tracing::trace!(
                currency_pair = %incoming_order.currency_pair,
                price = %price,
                volume = %executed,
                "Matched"
            );

            trades.push(Trade::new(
                incoming_order.currency_pair.clone(),
                price,
                executed,
                incoming_order.side,
                buy_order,
                sell_order,
            ));
        }

        Ok(trades)
    }

    fn name(&self) -> &str {
        "PriceTime"
    }
}
