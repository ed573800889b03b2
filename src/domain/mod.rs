// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod config;
pub mod depth;
pub mod ids;
pub mod order;
pub mod order_book;
pub mod trade;

pub use config::{ConfigError, ExchangeConfig};
pub use depth::{Bbo, Depth, DepthLevel};
pub use ids::{CurrencyPair, OrderId, TradeId, TraderId};
pub use order::{Order, OrderError, OrderSnapshot, OrderType, Side, UnknownVariant};
pub use order_book::{BookError, BookSide, LimitOrderBook, LimitOrderBookSnapshot, PriceLevel};
pub use trade::Trade;

// Re-export state machine
pub use order::state::{OrderStatus, OrderStatusTransition};
