// ============================================================================
// Matching Algorithm Interface
// Defines the contract for matching an aggressor against one book side
// ============================================================================

use crate::domain::{BookSide, Order, Trade};
use crate::engine::MatchingError;
use crate::numeric::Price;

/// Strategy pattern interface for matching algorithms
pub trait MatchingAlgorithm: Send + Sync {
    /// Match an incoming order against the opposite side of the book
    ///
    /// # Arguments
    /// * `incoming_order` - The accepted aggressor; filled in place
    /// * `opposite_side` - The opposite side of the order book; filled
    ///   resting orders and emptied levels are removed from it
    ///
    /// # Returns
    /// Trades in match order. An error means the book can no longer be
    /// trusted.
    fn match_order(
        &self,
        incoming_order: &mut Order,
        opposite_side: &mut BookSide,
    ) -> Result<Vec<Trade>, MatchingError>;

    /// Get the algorithm name for logging
    fn name(&self) -> &str;

    /// Check if the incoming order may trade at `book_price`
    fn prices_cross(&self, incoming: &Order, book_price: Price) -> bool {
        incoming.crosses(book_price)
    }
}
