// ============================================================================
// Numeric Module
// Decimal value types for prices and volumes
// ============================================================================
//
// This module provides:
// - Price: non-negative decimal that orders the book
// - Volume: non-negative decimal with underflow-checked subtraction
// - NumericError: Error types for construction and arithmetic
//
// Design principles:
// - No floating-point operations
// - Construction and subtraction return Result (no silent negatives)
// - Backed by rust_decimal so 493.34 stays exactly 493.34

mod errors;
mod price;
mod volume;

pub use errors::{NumericError, NumericResult};
pub use price::Price;
pub use volume::Volume;
