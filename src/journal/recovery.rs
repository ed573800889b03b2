// ============================================================================
// Recovery
// Rebuilding books and memory images from journaled records
// ============================================================================

use super::{JournalError, JournalRecord};
use crate::domain::{CurrencyPair, LimitOrderBookSnapshot};
use crate::engine::Exchange;
use crate::interfaces::{EventStore, EventSubscriber, OutputEvent, SequencedEvent, SubscriberError};
use std::collections::BTreeMap;

/// Last book snapshot of every pair, by append order.
///
/// Sequence numbers restart with every run, so position in the journal is
/// what decides which snapshot is newest.
pub fn recover_books(records: &[JournalRecord]) -> Vec<LimitOrderBookSnapshot> {
    let mut latest: BTreeMap<&CurrencyPair, &LimitOrderBookSnapshot> = BTreeMap::new();
    for record in records {
        if let OutputEvent::LimitOrderBook(book) = &record.event {
            latest.insert(&book.currency_pair, book);
        }
    }
    latest.into_values().cloned().collect()
}

/// Restore every journaled book into `exchange`.
///
/// Returns the number of books restored. Must run before the exchange is
/// handed to the input sequencer.
pub fn restore_exchange<S: EventStore>(
    exchange: &mut Exchange,
    store: &S,
) -> Result<usize, JournalError> {
    let records = store.read_all()?;
    let books = recover_books(&records);

    for book in &books {
        exchange.restore_book(book)?;
    }

    tracing::info!(records = records.len(), books = books.len(), "Exchange recovered from journal");
    Ok(books.len())
}

/// Feed journaled events to a subscriber, e.g. to rebuild a memory image.
///
/// Events are renumbered from 1 in journal order.
pub fn replay<S: EventSubscriber + ?Sized>(
    records: &[JournalRecord],
    subscriber: &mut S,
) -> Result<u64, SubscriberError> {
    let mut sequence = 0;
    for record in records {
        sequence += 1;
        subscriber.on_event(&SequencedEvent::new(sequence, record.event.clone()))?;
    }
    Ok(sequence)
}
