// ============================================================================
// Read Model Module
// Memory images kept current from the output event stream
// ============================================================================

//! Each image is an [`EventSubscriber`](crate::interfaces::EventSubscriber)
//! and a cheap, cloneable query handle at the same time: attach one clone to
//! the output bus and query through another.

pub mod bbo_image;
pub mod depth_image;
pub mod ohlc_image;
pub mod order_image;

pub use bbo_image::{BboMemoryImage, BboRepresentation};
pub use depth_image::{DepthMemoryImage, DepthRepresentation};
pub use ohlc_image::{bar_time, OhlcBar, OhlcMemoryImage};
pub use order_image::{OrderMemoryImage, OrderRepresentation, TradeRepresentation};
