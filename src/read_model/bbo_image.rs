// ============================================================================
// BBO Memory Image
// ============================================================================

use crate::domain::{Bbo, CurrencyPair, DepthLevel};
use crate::interfaces::{EventSubscriber, OutputEvent, SequencedEvent, SubscriberError};
use crate::numeric::{Price, Volume};
use crossbeam_skiplist::SkipMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Best bid and offer of one pair. An empty side reads as zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BboRepresentation {
    pub currency_pair: CurrencyPair,
    pub best_bid_price: Price,
    pub best_bid_volume: Volume,
    pub best_bid_order_count: usize,
    pub best_ask_price: Price,
    pub best_ask_volume: Volume,
    pub best_ask_order_count: usize,
    /// Sequence of the event this was taken from
    pub sequence: u64,
}

impl BboRepresentation {
    pub fn from_bbo(bbo: &Bbo, sequence: u64) -> Self {
        let (best_bid_price, best_bid_volume, best_bid_order_count) = unpack(bbo.best_bid.as_ref());
        let (best_ask_price, best_ask_volume, best_ask_order_count) = unpack(bbo.best_ask.as_ref());
        Self {
            currency_pair: bbo.currency_pair.clone(),
            best_bid_price,
            best_bid_volume,
            best_bid_order_count,
            best_ask_price,
            best_ask_volume,
            best_ask_order_count,
            sequence,
        }
    }
}

fn unpack(level: Option<&DepthLevel>) -> (Price, Volume, usize) {
    level.map_or((Price::ZERO, Volume::ZERO, 0), |l| (l.price, l.volume, l.order_count))
}

/// Latest BBO of every pair.
///
/// Clones share state: keep one to query while the bus owns another.
#[derive(Debug, Clone, Default)]
pub struct BboMemoryImage {
    entries: Arc<SkipMap<CurrencyPair, BboRepresentation>>,
}

impl BboMemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, currency_pair: &CurrencyPair) -> Option<BboRepresentation> {
        self.entries
            .get(currency_pair)
            .map(|entry| entry.value().clone())
    }

    /// Every pair seen so far, ordered by pair
    pub fn all(&self) -> Vec<BboRepresentation> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply(&self, bbo: &Bbo, sequence: u64) {
        self.entries.insert(
            bbo.currency_pair.clone(),
            BboRepresentation::from_bbo(bbo, sequence),
        );
    }
}

impl EventSubscriber for BboMemoryImage {
    fn name(&self) -> &str {
        "bbo-image"
    }

    fn on_event(&mut self, event: &SequencedEvent) -> Result<(), SubscriberError> {
        if let OutputEvent::Bbo(bbo) = &event.event {
            self.apply(bbo, event.sequence);
        }
        Ok(())
    }
}
