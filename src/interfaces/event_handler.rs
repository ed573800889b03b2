// ============================================================================
// Event Handler Interface
// Defines the output event contract and the sink the matching thread writes to
// ============================================================================

use crate::domain::{Bbo, CurrencyPair, Depth, LimitOrderBookSnapshot, OrderSnapshot, Trade};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

/// Events emitted by the matching engine
///
/// Serialized as `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutputEvent {
    /// New state of an order touched by a command
    OrderUpdated(OrderSnapshot),

    /// One execution between an aggressor and a resting order
    Trade(Trade),

    /// Top levels of both sides after a book change
    Depth(Depth),

    /// Best bid and offer after a book change
    Bbo(Bbo),

    /// Full book contents after a book change
    LimitOrderBook(LimitOrderBookSnapshot),
}

impl OutputEvent {
    pub fn currency_pair(&self) -> &CurrencyPair {
        match self {
            OutputEvent::OrderUpdated(order) => &order.currency_pair,
            OutputEvent::Trade(trade) => &trade.currency_pair,
            OutputEvent::Depth(depth) => &depth.currency_pair,
            OutputEvent::Bbo(bbo) => &bbo.currency_pair,
            OutputEvent::LimitOrderBook(book) => &book.currency_pair,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            OutputEvent::OrderUpdated(_) => "order_updated",
            OutputEvent::Trade(_) => "trade",
            OutputEvent::Depth(_) => "depth",
            OutputEvent::Bbo(_) => "bbo",
            OutputEvent::LimitOrderBook(_) => "limit_order_book",
        }
    }
}

/// Events produced by one command, in emission order
pub type EventBatch = SmallVec<[OutputEvent; 8]>;

/// Events that did not reach every consumer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("events not delivered: {0}")]
pub struct PublishError(pub String);

/// Event handler trait for processing matching engine events
///
/// Called from the matching thread; implementations must not reorder events.
/// An error means the event stream is no longer complete for some consumer.
pub trait EventHandler: Send + Sync {
    /// Handle an output event
    fn on_event(&self, event: OutputEvent) -> Result<(), PublishError>;

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: EventBatch) -> Result<(), PublishError> {
        for event in events {
            self.on_event(event)?;
        }
        Ok(())
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: OutputEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: OutputEvent) -> Result<(), PublishError> {
        tracing::debug!(
            currency_pair = %event.currency_pair(),
            kind = event.kind(),
            "Matching engine event: {:?}",
            event
        );
        Ok(())
    }
}

/// Keeps every event in memory, in arrival order
#[derive(Default)]
pub struct CollectingEventHandler {
    events: Mutex<Vec<OutputEvent>>,
}

impl CollectingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event collected so far
    pub fn drain(&self) -> Vec<OutputEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventHandler for CollectingEventHandler {
    fn on_event(&self, event: OutputEvent) -> Result<(), PublishError> {
        self.events.lock().push(event);
        Ok(())
    }

    fn on_events(&self, events: EventBatch) -> Result<(), PublishError> {
        self.events.lock().extend(events);
        Ok(())
    }
}
