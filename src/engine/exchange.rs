// ============================================================================
// Exchange
// Routes commands to the matching engine of their currency pair
// ============================================================================

use super::{CancelOutcome, Execution, ExchangeError, MatchingEngine, PriceTimePriority};
use crate::domain::{
    ConfigError, CurrencyPair, ExchangeConfig, LimitOrderBook, LimitOrderBookSnapshot, Order,
};
use crate::interfaces::{EventBatch, EventHandler, NoOpEventHandler, PublishError};
use crate::pipeline::{CancelOrder, Command, CommandOutcome};
use std::collections::HashMap;
use std::sync::Arc;

/// Sole owner of every order book.
///
/// Not shareable: the input sequencer moves it onto the matching thread, which
/// makes that thread the only writer.
pub struct Exchange {
    engines: HashMap<CurrencyPair, MatchingEngine>,
    /// Pairs in configuration order
    currency_pairs: Vec<CurrencyPair>,
    depth_levels: usize,
    event_handler: Arc<dyn EventHandler>,
    /// First delivery failure; halts every pair
    publish_failure: Option<PublishError>,
}

impl Exchange {
    /// One price-time engine per configured pair
    pub fn new(config: &ExchangeConfig, event_handler: Arc<dyn EventHandler>) -> Result<Self, ConfigError> {
        config.validate()?;

        let engines = config
            .currency_pairs
            .iter()
            .map(|pair| {
                let engine = MatchingEngine::new(
                    pair.clone(),
                    Box::new(PriceTimePriority::new()),
                    config.depth_levels,
                );
                (pair.clone(), engine)
            })
            .collect();

        tracing::info!(
            currency_pairs = ?config.currency_pairs,
            depth_levels = config.depth_levels,
            "Exchange created"
        );

        Ok(Self {
            engines,
            currency_pairs: config.currency_pairs.clone(),
            depth_levels: config.depth_levels,
            event_handler,
            publish_failure: None,
        })
    }

    /// Exchange whose events go nowhere
    pub fn detached(config: &ExchangeConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(NoOpEventHandler))
    }

    /// Replace the sink that receives every event batch.
    ///
    /// Lifts a halt caused by undelivered events.
    pub fn set_event_handler(&mut self, event_handler: Arc<dyn EventHandler>) {
        self.event_handler = event_handler;
        self.publish_failure = None;
    }

    pub fn currency_pairs(&self) -> &[CurrencyPair] {
        &self.currency_pairs
    }

    pub fn book(&self, currency_pair: &CurrencyPair) -> Option<&LimitOrderBook> {
        self.engines.get(currency_pair).map(MatchingEngine::book)
    }

    pub fn is_halted(&self, currency_pair: &CurrencyPair) -> bool {
        self.engines
            .get(currency_pair)
            .is_some_and(|engine| engine.is_halted() || self.publish_failure.is_some())
    }

    /// Match a new order; its events are forwarded to the event handler.
    pub fn place_new_order(&mut self, order: Order) -> Result<Execution, ExchangeError> {
        let currency_pair = order.currency_pair.clone();
        let engine = self.engine_mut(&currency_pair)?;

        let processed = engine
            .place_order(order)
            .map_err(|e| ExchangeError::from_matching(&currency_pair, e))?;

        self.publish(processed.events)?;
        Ok(processed.outcome)
    }

    /// Cancel a resting order; unknown or foreign orders are reported, not
    /// treated as errors.
    pub fn cancel_order(&mut self, cancellation: &CancelOrder) -> Result<CancelOutcome, ExchangeError> {
        let engine = self.engine_mut(&cancellation.currency_pair)?;

        let processed = engine
            .cancel_order(&cancellation.order_id, &cancellation.trader_id)
            .map_err(|e| ExchangeError::from_matching(&cancellation.currency_pair, e))?;

        if !processed.events.is_empty() {
            self.publish(processed.events)?;
        }
        Ok(processed.outcome)
    }

    /// Apply one sequenced command
    pub fn execute(&mut self, command: Command) -> Result<CommandOutcome, ExchangeError> {
        match command {
            Command::Place(place) => self
                .place_new_order(place.into_order())
                .map(CommandOutcome::Placed),
            Command::Cancel(cancel) => self.cancel_order(&cancel).map(CommandOutcome::Cancel),
        }
    }

    /// Replace a pair's book with a recovered snapshot.
    ///
    /// Clears a halt on that pair. No events are emitted.
    pub fn restore_book(&mut self, snapshot: &LimitOrderBookSnapshot) -> Result<(), ExchangeError> {
        let currency_pair = snapshot.currency_pair.clone();
        if !self.engines.contains_key(&currency_pair) {
            return Err(ExchangeError::UnsupportedCurrencyPair(currency_pair));
        }

        let book = LimitOrderBook::restore(snapshot).map_err(|e| {
            ExchangeError::from_matching(&currency_pair, e.into())
        })?;
        let orders = snapshot.order_count();
        let engine = MatchingEngine::with_book(book, Box::new(PriceTimePriority::new()), self.depth_levels);
        self.engines.insert(currency_pair.clone(), engine);

        tracing::info!(currency_pair = %currency_pair, orders, "Order book restored");
        Ok(())
    }

    fn publish(&mut self, events: EventBatch) -> Result<(), ExchangeError> {
        if let Err(error) = self.event_handler.on_events(events) {
            tracing::error!(%error, "Output events not delivered, exchange halted");
            self.publish_failure = Some(error.clone());
            return Err(ExchangeError::EventsUndelivered(error));
        }
        Ok(())
    }

    fn engine_mut(&mut self, currency_pair: &CurrencyPair) -> Result<&mut MatchingEngine, ExchangeError> {
        if let Some(error) = &self.publish_failure {
            return Err(ExchangeError::EventsUndelivered(error.clone()));
        }

        let engine = self
            .engines
            .get_mut(currency_pair)
            .ok_or_else(|| ExchangeError::UnsupportedCurrencyPair(currency_pair.clone()))?;

        if engine.is_halted() {
            return Err(ExchangeError::EngineHalted(currency_pair.clone()));
        }
        Ok(engine)
    }
}
