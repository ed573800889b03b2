// ============================================================================
// Engine Errors
// ============================================================================

use crate::domain::{BookError, CurrencyPair, OrderError, OrderId};
use crate::interfaces::PublishError;
use crate::numeric::{NumericError, Price};
use crate::pipeline::ValidationError;
use thiserror::Error;

/// Failures raised while an engine processes a command.
///
/// Everything except `Rejected` and `Halted` is an invariant violation: the
/// engine halts and refuses further commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchingError {
    #[error("order rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("matching engine for {0} is halted")]
    Halted(CurrencyPair),

    #[error("duplicate order id {0}")]
    DuplicateOrderId(OrderId),

    #[error("book crossed after matching: bid {bid} >= ask {ask}")]
    CrossedBook { bid: Price, ask: Price },

    #[error("resting order {0} has no open quantity")]
    EmptyRestingOrder(OrderId),

    #[error("book invariant violated: {0}")]
    Book(#[from] BookError),

    #[error("order invariant violated: {0}")]
    Order(#[from] OrderError),

    #[error("volume invariant violated: {0}")]
    Numeric(#[from] NumericError),
}

impl MatchingError {
    pub fn is_invariant_violation(&self) -> bool {
        !matches!(self, MatchingError::Rejected(_) | MatchingError::Halted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("unsupported currency pair {0}")]
    UnsupportedCurrencyPair(CurrencyPair),

    #[error("matching engine for {0} is halted")]
    EngineHalted(CurrencyPair),

    #[error("order rejected: {0}")]
    Rejected(ValidationError),

    /// The command was applied but its events missed a consumer; the
    /// exchange refuses further commands until a new event handler is set.
    #[error("exchange halted: {0}")]
    EventsUndelivered(PublishError),

    #[error("{currency_pair}: {source}")]
    Matching {
        currency_pair: CurrencyPair,
        #[source]
        source: MatchingError,
    },
}

impl ExchangeError {
    pub(crate) fn from_matching(currency_pair: &CurrencyPair, error: MatchingError) -> Self {
        match error {
            MatchingError::Rejected(reason) => ExchangeError::Rejected(reason),
            MatchingError::Halted(pair) => ExchangeError::EngineHalted(pair),
            source => ExchangeError::Matching {
                currency_pair: currency_pair.clone(),
                source,
            },
        }
    }
}
