// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod event_handler;
mod event_store;
mod matching_algorithm;
mod subscriber;

pub use event_handler::{
    CollectingEventHandler, EventBatch, EventHandler, LoggingEventHandler, NoOpEventHandler,
    OutputEvent, PublishError,
};
pub use event_store::EventStore;
pub use matching_algorithm::MatchingAlgorithm;
pub use subscriber::{EventSubscriber, SequencedEvent, SharedEvent, SubscriberError};
