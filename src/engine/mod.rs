// ============================================================================
// Engine Module
// Contains the core matching engine business logic
// ============================================================================

mod errors;
mod exchange;
mod matching_engine;
mod price_time;

pub use errors::{ExchangeError, MatchingError};
pub use exchange::Exchange;
pub use matching_engine::{CancelOutcome, Execution, MatchingEngine, Processed};
pub use price_time::PriceTimePriority;
