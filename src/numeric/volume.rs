// ============================================================================
// Volume
// Non-negative decimal quantity with underflow-checked arithmetic
// ============================================================================

use super::errors::{NumericError, NumericResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Order or trade quantity. Never negative; zero means "fully filled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Volume(Decimal);

impl Volume {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a volume, rejecting negative values.
    pub fn new(value: Decimal) -> NumericResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(NumericError::Negative(value));
        }
        Ok(Self(value.normalize()))
    }

    pub fn from_integer(value: i64) -> NumericResult<Self> {
        Self::new(Decimal::from(value))
    }

    #[inline]
    pub const fn value(self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition.
    ///
    /// # Errors
    /// Returns `Overflow` if the result is out of the decimal range.
    pub fn checked_add(self, rhs: Self) -> NumericResult<Self> {
        self.0
            .checked_add(rhs.0)
            .map(|v| Self(v.normalize()))
            .ok_or(NumericError::Overflow)
    }

    /// Checked subtraction that refuses to go below zero.
    ///
    /// # Errors
    /// Returns `Underflow` if `rhs` is larger than `self`.
    pub fn checked_sub(self, rhs: Self) -> NumericResult<Self> {
        if rhs.0 > self.0 {
            return Err(NumericError::Underflow {
                minuend: self.0,
                subtrahend: rhs.0,
            });
        }
        Ok(Self((self.0 - rhs.0).normalize()))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Volume {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| NumericError::InvalidInput)?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Volume {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Volume> for Decimal {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}

// Summing non-negative volumes cannot go negative; it saturates on overflow
// rather than panicking.
impl Sum for Volume {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| {
            Self(acc.0.checked_add(v.0).unwrap_or(Decimal::MAX))
        })
    }
}

impl<'a> Sum<&'a Volume> for Volume {
    fn sum<I: Iterator<Item = &'a Volume>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
