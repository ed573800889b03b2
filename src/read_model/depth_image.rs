// ============================================================================
// Depth Memory Image
// ============================================================================

use crate::domain::{CurrencyPair, Depth, DepthLevel};
use crate::interfaces::{EventSubscriber, OutputEvent, SequencedEvent, SubscriberError};
use crossbeam_skiplist::SkipMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRepresentation {
    pub currency_pair: CurrencyPair,
    /// Best price first
    pub bids: Vec<DepthLevel>,
    /// Best price first
    pub asks: Vec<DepthLevel>,
    pub sequence: u64,
}

/// Aggregated price levels of every pair, truncated to `levels` per side
#[derive(Debug, Clone)]
pub struct DepthMemoryImage {
    levels: usize,
    entries: Arc<SkipMap<CurrencyPair, DepthRepresentation>>,
}

impl DepthMemoryImage {
    pub fn new(levels: usize) -> Self {
        Self {
            levels,
            entries: Arc::new(SkipMap::new()),
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn get(&self, currency_pair: &CurrencyPair) -> Option<DepthRepresentation> {
        self.entries
            .get(currency_pair)
            .map(|entry| entry.value().clone())
    }

    pub fn bid_depth(&self, currency_pair: &CurrencyPair) -> Vec<DepthLevel> {
        self.get(currency_pair).map(|d| d.bids).unwrap_or_default()
    }

    pub fn ask_depth(&self, currency_pair: &CurrencyPair) -> Vec<DepthLevel> {
        self.get(currency_pair).map(|d| d.asks).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply(&self, depth: &Depth, sequence: u64) {
        let truncate = |levels: &[DepthLevel]| -> Vec<DepthLevel> {
            levels.iter().take(self.levels).copied().collect()
        };
        self.entries.insert(
            depth.currency_pair.clone(),
            DepthRepresentation {
                currency_pair: depth.currency_pair.clone(),
                bids: truncate(depth.bids.as_slice()),
                asks: truncate(depth.asks.as_slice()),
                sequence,
            },
        );
    }
}

impl EventSubscriber for DepthMemoryImage {
    fn name(&self) -> &str {
        "depth-image"
    }

    fn on_event(&mut self, event: &SequencedEvent) -> Result<(), SubscriberError> {
        if let OutputEvent::Depth(depth) = &event.event {
            self.apply(depth, event.sequence);
        }
        Ok(())
    }
}
