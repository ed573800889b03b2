// ============================================================================
// Pipeline Module
// Input sequencing, command types and output event fan-out
// ============================================================================

pub mod command;
pub mod input_sequencer;
pub mod output_bus;
pub mod retry;

pub use command::{CancelOrder, Command, CommandOutcome, PlaceOrder, ValidationError};
pub use input_sequencer::{
    CommandReceipt, InputSequencer, SequencerHandle, SequencerStats, SubmitError, Ticket,
};
pub use output_bus::{BusError, BusPublisher, BusStats, OutputBus, OutputBusBuilder, SubscriberStats};
pub use retry::RetryPolicy;

use crate::domain::{ConfigError, ExchangeConfig};
use crate::engine::Exchange;
use crate::interfaces::{EventSubscriber, NoOpEventHandler};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{0} thread panicked")]
    ThreadPanicked(String),

    #[error("pipeline already stopped")]
    AlreadyStopped,
}

/// Exchange, input sequencer and output bus wired together.
///
/// Producers submit through [`handle`](TradingPipeline::handle); every event
/// the exchange emits reaches every subscriber in one global order.
pub struct TradingPipeline {
    sequencer: InputSequencer,
    bus: OutputBus,
}

impl TradingPipeline {
    /// Start with empty order books
    pub fn start(
        config: &ExchangeConfig,
        subscribers: Vec<Box<dyn EventSubscriber>>,
    ) -> Result<Self, PipelineError> {
        let exchange = Exchange::detached(config)?;
        Self::start_with(exchange, config, subscribers)
    }

    /// Start from an existing exchange, e.g. one whose books were restored
    /// from the journal
    pub fn start_with(
        mut exchange: Exchange,
        config: &ExchangeConfig,
        subscribers: Vec<Box<dyn EventSubscriber>>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let bus = subscribers
            .into_iter()
            .fold(
                OutputBus::builder(config.output_capacity).retry(config.retry),
                OutputBusBuilder::boxed_subscriber,
            )
            .start()?;

        exchange.set_event_handler(Arc::new(bus.publisher()));
        let sequencer = InputSequencer::start(exchange, config)?;

        tracing::info!(
            subscribers = bus.subscriber_count(),
            "Trading pipeline started"
        );
        Ok(Self { sequencer, bus })
    }

    pub fn handle(&self) -> SequencerHandle {
        self.sequencer.handle()
    }

    pub fn publisher(&self) -> BusPublisher {
        self.bus.publisher()
    }

    /// Wait for subscribers to catch up with everything published so far
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        self.bus.wait_until_drained(timeout)
    }

    /// Drain admitted commands, then drain the bus.
    ///
    /// The returned exchange is detached from the stopped bus.
    pub fn shutdown(self) -> Result<(Exchange, BusStats), PipelineError> {
        let Self { sequencer, bus } = self;

        let mut exchange = sequencer.shutdown()?;
        exchange.set_event_handler(Arc::new(NoOpEventHandler));

        let stats = bus.shutdown()?;
        tracing::info!(published = stats.published, "Trading pipeline stopped");
        Ok((exchange, stats))
    }
}
