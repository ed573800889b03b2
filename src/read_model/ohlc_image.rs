// ============================================================================
// OHLC Memory Image
// One-minute bars per currency pair, built from trades
// ============================================================================

use crate::domain::{CurrencyPair, Trade};
use crate::interfaces::{EventSubscriber, OutputEvent, SequencedEvent, SubscriberError};
use crate::numeric::{NumericError, NumericResult, Price, Volume};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const BAR_SECONDS: i64 = 60;

/// Trades of one pair within one minute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub currency_pair: CurrencyPair,
    /// End of the minute the bar covers
    pub bar_time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    /// Sum of price times volume
    pub total_weight: Decimal,
    /// `total_weight / volume`
    pub average_price: Decimal,
    pub trade_count: u64,
}

impl OhlcBar {
    fn open(trade: &Trade, bar_time: DateTime<Utc>) -> NumericResult<Self> {
        let weight = trade.notional_value()?;
        Ok(Self {
            currency_pair: trade.currency_pair.clone(),
            bar_time,
            open: trade.execution_price,
            high: trade.execution_price,
            low: trade.execution_price,
            close: trade.execution_price,
            volume: trade.executed_volume,
            total_weight: weight,
            average_price: trade.execution_price.value(),
            trade_count: 1,
        })
    }

    /// Fold a trade into the bar; on overflow the bar is left untouched
    fn add(&mut self, trade: &Trade) -> NumericResult<()> {
        let volume = self.volume.checked_add(trade.executed_volume)?;
        let weight = self
            .total_weight
            .checked_add(trade.notional_value()?)
            .ok_or(NumericError::Overflow)?;
        let average_price = if volume.is_zero() {
            self.average_price
        } else {
            weight
                .checked_div(volume.value())
                .ok_or(NumericError::Overflow)?
        };

        let price = trade.execution_price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume = volume;
        self.total_weight = weight;
        self.average_price = average_price;
        self.trade_count += 1;
        Ok(())
    }
}

/// Closing time of the one-minute bar containing `time`
pub fn bar_time(time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let seconds = time.timestamp();
    let start = seconds - seconds.rem_euclid(BAR_SECONDS);
    DateTime::from_timestamp(start + BAR_SECONDS, 0)
}

type Bars = HashMap<CurrencyPair, BTreeMap<DateTime<Utc>, OhlcBar>>;

/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct OhlcMemoryImage {
    bars: Arc<RwLock<Bars>>,
}

impl OhlcMemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every bar of a pair, oldest first
    pub fn bars(&self, currency_pair: &CurrencyPair) -> Vec<OhlcBar> {
        self.bars
            .read()
            .get(currency_pair)
            .map(|bars| bars.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bar(&self, currency_pair: &CurrencyPair, bar_time: DateTime<Utc>) -> Option<OhlcBar> {
        self.bars
            .read()
            .get(currency_pair)
            .and_then(|bars| bars.get(&bar_time).cloned())
    }

    pub fn latest(&self, currency_pair: &CurrencyPair) -> Option<OhlcBar> {
        self.bars
            .read()
            .get(currency_pair)
            .and_then(|bars| bars.values().next_back().cloned())
    }

    pub fn apply_trade(&self, trade: &Trade) {
        let Some(time) = bar_time(trade.execution_time) else {
            tracing::warn!(trade_id = %trade.trade_id, "Trade time outside bar range");
            return;
        };

        let mut bars = self.bars.write();
        let series = bars.entry(trade.currency_pair.clone()).or_default();
        let result = match series.entry(time) {
            Entry::Occupied(mut bar) => bar.get_mut().add(trade),
            Entry::Vacant(slot) => OhlcBar::open(trade, time).map(|bar| {
                slot.insert(bar);
            }),
        };

        if let Err(error) = result {
            tracing::warn!(trade_id = %trade.trade_id, %error, "Trade left out of OHLC bar");
        }
    }
}

impl EventSubscriber for OhlcMemoryImage {
    fn name(&self) -> &str {
        "ohlc-image"
    }

    fn on_event(&mut self, event: &SequencedEvent) -> Result<(), SubscriberError> {
        if let OutputEvent::Trade(trade) = &event.event {
            self.apply_trade(trade);
        }
        Ok(())
    }
}
