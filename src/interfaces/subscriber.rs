// ============================================================================
// Event Subscriber Interface
// Consumers attached to the output bus, each driven by its own thread
// ============================================================================

use super::OutputEvent;
use crate::journal::JournalError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// An output event stamped with its position in the global event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event: OutputEvent,
}

impl SequencedEvent {
    pub fn new(sequence: u64, event: OutputEvent) -> Self {
        Self { sequence, event }
    }
}

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("{subscriber} failed: {reason}")]
    Failed { subscriber: String, reason: String },
}

impl SubscriberError {
    pub fn failed(subscriber: impl Into<String>, reason: impl Into<String>) -> Self {
        SubscriberError::Failed {
            subscriber: subscriber.into(),
            reason: reason.into(),
        }
    }
}

/// A consumer of the full output event stream
///
/// Events arrive in global sequence order. A returned error makes the bus
/// retry the same event with backoff; the subscriber does not see the next
/// event until this one succeeds.
pub trait EventSubscriber: Send + 'static {
    /// Name used in logs and statistics
    fn name(&self) -> &str;

    fn on_event(&mut self, event: &SequencedEvent) -> Result<(), SubscriberError>;

    /// Called once after the last event, before the worker exits
    fn on_shutdown(&mut self) -> Result<(), SubscriberError> {
        Ok(())
    }
}

/// Events shared between subscriber channels
pub type SharedEvent = Arc<SequencedEvent>;
