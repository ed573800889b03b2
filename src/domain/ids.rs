// ============================================================================
// Identifiers
// Opaque string identifiers compared by value
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Order identifier, assigned by the caller (or generated) before admission
    OrderId
);
string_id!(
    /// Trader that owns an order
    TraderId
);
string_id!(
    /// Trade identifier, generated by the matching engine
    TradeId
);
string_id!(
    /// Currency pair symbol, e.g. `BTCUSD`
    CurrencyPair
);

impl OrderId {
    /// Fresh random order id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl TradeId {
    /// Fresh random trade id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
