// ============================================================================
// Numeric Errors
// Error types for price and volume arithmetic
// ============================================================================

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while building or combining prices and volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NumericError {
    /// A value that must never be negative was negative
    #[error("negative value not allowed: {0}")]
    Negative(Decimal),
    /// Subtraction would have produced a negative volume
    #[error("arithmetic underflow: {minuend} - {subtrahend} is negative")]
    Underflow {
        minuend: Decimal,
        subtrahend: Decimal,
    },
    /// Result exceeded the decimal range
    #[error("arithmetic overflow: result exceeded maximum value")]
    Overflow,
    /// Input string could not be parsed
    #[error("invalid input: could not parse value")]
    InvalidInput,
}

/// Result type alias for numeric operations
pub type NumericResult<T> = Result<T, NumericError>;
