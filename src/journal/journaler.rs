// ============================================================================
// Journaler
// Output bus subscriber appending every event to an event store
// ============================================================================

use super::JournalRecord;
use crate::interfaces::{EventStore, EventSubscriber, SequencedEvent, SubscriberError};

/// Default number of records between flushes
pub const DEFAULT_FLUSH_EVERY: usize = 64;

/// Persists the output stream.
///
/// Records are flushed every `flush_every` appends and on shutdown. A retried
/// event is appended once: only the pending flush is repeated.
pub struct Journaler<S: EventStore> {
    store: S,
    flush_every: usize,
    unflushed: usize,
    last_sequence: u64,
}

impl<S: EventStore> Journaler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            flush_every: DEFAULT_FLUSH_EVERY,
            unflushed: 0,
            last_sequence: 0,
        }
    }

    /// Builder method: Flush after this many records (1 flushes every record)
    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

impl<S: EventStore> EventSubscriber for Journaler<S> {
    fn name(&self) -> &str {
        "journaler"
    }

    fn on_event(&mut self, event: &SequencedEvent) -> Result<(), SubscriberError> {
        if event.sequence > self.last_sequence {
            self.store.append(&JournalRecord::from_event(event))?;
            self.last_sequence = event.sequence;
            self.unflushed += 1;
        }

        if self.unflushed >= self.flush_every {
            self.store.flush()?;
            self.unflushed = 0;
        }
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<(), SubscriberError> {
        self.store.flush()?;
        self.unflushed = 0;
        tracing::info!(last_sequence = self.last_sequence, "Journal flushed");
        Ok(())
    }
}
