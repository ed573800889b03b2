// ============================================================================
// Price
// Non-negative decimal price that defines book ordering
// ============================================================================

use super::errors::{NumericError, NumericResult};
use super::Volume;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price of an order or an execution.
///
/// Limit orders always carry a strictly positive price. Market orders carry
/// [`Price::ZERO`], which never takes part in book ordering because market
/// orders never rest.
///
/// Equality ignores trailing zeros: `493.340 == 493.34`, so both aggregate
/// into the same depth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero price (used by market orders)
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price, rejecting negative values.
    pub fn new(value: Decimal) -> NumericResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(NumericError::Negative(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Create a price from a whole number.
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

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Notional value of `volume` units at this price.
    pub fn checked_notional(self, volume: Volume) -> NumericResult<Decimal> {
        self.0
            .checked_mul(volume.value())
            .ok_or(NumericError::Overflow)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| NumericError::InvalidInput)?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_negative_price_rejected() {
        assert_eq!(
            Price::new(dec!(-1.5)),
            Err(NumericError::Negative(dec!(-1.5)))
        );
        assert!(Price::new(Decimal::ZERO).unwrap().is_zero());
    }

    #[test]
    fn test_trailing_zeros_compare_equal() {
        let a = Price::new(dec!(493.340)).unwrap();
        let b = Price::new(dec!(493.34)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "493.34");
    }

    #[test]
    fn test_ordering() {
        let low = Price::new(dec!(491.34)).unwrap();
        let high = Price::new(dec!(493.34)).unwrap();
        assert!(low < high);
        assert_eq!(low.max(high), high);
    }

    #[test]
    fn test_parse() {
        let price: Price = "496.34".parse().unwrap();
        assert_eq!(price.value(), dec!(496.34));
        assert_eq!("abc".parse::<Price>(), Err(NumericError::InvalidInput));
        assert!(matches!("-3".parse::<Price>(), Err(NumericError::Negative(_))));
    }

    #[test]
    fn test_notional() {
        let price = Price::new(dec!(100.5)).unwrap();
        let volume = Volume::new(dec!(2)).unwrap();
        assert_eq!(price.checked_notional(volume).unwrap(), dec!(201.0));
    }
}
