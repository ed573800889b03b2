// ============================================================================
// Input Sequencer
// Serializes commands from many producers onto the single matching thread
// ============================================================================

use super::command::{Command, CommandOutcome, ValidationError};
use super::PipelineError;
use crate::domain::{CurrencyPair, ExchangeConfig, OrderId};
use crate::engine::{Exchange, ExchangeError};
use crate::utils;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("command rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("input sequencer is full")]
    Full,

    #[error("input sequencer is closed")]
    Closed,

    #[error("timed out waiting for the command outcome")]
    Timeout,

    #[error("matching thread exited before answering")]
    Disconnected,
}

/// Result of one sequenced command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReceipt {
    /// Position of the command in the global input sequence, from 1
    pub sequence: u64,
    pub result: Result<CommandOutcome, ExchangeError>,
}

enum Envelope {
    Command {
        command: Command,
        reply: Sender<CommandReceipt>,
    },
    Shutdown,
}

// ============================================================================
// Ticket
// ============================================================================

/// Claim on the outcome of an admitted command
#[derive(Debug)]
pub struct Ticket {
    order_id: OrderId,
    receiver: Receiver<CommandReceipt>,
}

impl Ticket {
    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// Block until the matching thread has processed the command
    pub fn wait(self) -> Result<CommandReceipt, SubmitError> {
        self.receiver.recv().map_err(|_| SubmitError::Disconnected)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<CommandReceipt, SubmitError> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => SubmitError::Timeout,
            RecvTimeoutError::Disconnected => SubmitError::Disconnected,
        })
    }
}

// ============================================================================
// Sequencer Handle
// ============================================================================

/// Input sequencer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencerStats {
    pub admitted: u64,
    pub rejected: u64,
    pub processed: u64,
    pub commands_in_queue: usize,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
}

/// Producer-side handle; cheap to clone and share across threads
#[derive(Clone)]
pub struct SequencerHandle {
    sender: Sender<Envelope>,
    /// `true` while admission is open
    gate: Arc<RwLock<bool>>,
    supported: Arc<HashSet<CurrencyPair>>,
    counters: Arc<Counters>,
}

impl SequencerHandle {
    /// Validate and admit a command, blocking while the input buffer is full.
    pub fn submit(&self, command: impl Into<Command>) -> Result<Ticket, SubmitError> {
        let command = self.admit(command.into())?;
        let (envelope, ticket) = Self::envelope(command);

        let open = self.gate.read();
        if !*open {
            return Err(SubmitError::Closed);
        }
        self.sender
            .send(envelope)
            .map_err(|_| SubmitError::Closed)?;
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(ticket)
    }

    /// Validate and admit a command without blocking.
    pub fn try_submit(&self, command: impl Into<Command>) -> Result<Ticket, SubmitError> {
        let command = self.admit(command.into())?;
        let (envelope, ticket) = Self::envelope(command);

        let open = self.gate.read();
        if !*open {
            return Err(SubmitError::Closed);
        }
        self.sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Disconnected(_) => SubmitError::Closed,
        })?;
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(ticket)
    }

    pub fn is_open(&self) -> bool {
        *self.gate.read()
    }

    pub fn stats(&self) -> SequencerStats {
        SequencerStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            commands_in_queue: self.sender.len(),
        }
    }

    fn admit(&self, command: Command) -> Result<Command, SubmitError> {
        if let Err(reason) = command.validate(&self.supported) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(order_id = %command.order_id(), %reason, "Command rejected");
            return Err(reason.into());
        }
        Ok(command)
    }

    fn envelope(command: Command) -> (Envelope, Ticket) {
        let (reply, receiver) = bounded(1);
        let ticket = Ticket {
            order_id: command.order_id().clone(),
            receiver,
        };
        (Envelope::Command { command, reply }, ticket)
    }
}

// ============================================================================
// Input Sequencer
// ============================================================================

/// Owns the matching thread, and through it the [`Exchange`].
///
/// Commands are applied one at a time in the order they entered the bounded
/// input channel.
pub struct InputSequencer {
    handle: SequencerHandle,
    thread: Option<JoinHandle<Exchange>>,
}

impl InputSequencer {
    /// Move the exchange onto a new matching thread
    pub fn start(exchange: Exchange, config: &ExchangeConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let (sender, receiver) = bounded(config.input_capacity);
        let counters = Arc::new(Counters::default());
        let handle = SequencerHandle {
            sender,
            gate: Arc::new(RwLock::new(true)),
            supported: Arc::new(exchange.currency_pairs().iter().cloned().collect()),
            counters: Arc::clone(&counters),
        };

        let pin = config.pin_matching_thread;
        let thread = thread::Builder::new()
            .name("matching".to_string())
            .spawn(move || run(exchange, receiver, counters, pin))?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Close admission, process everything already admitted, then hand the
    /// exchange back.
    pub fn shutdown(mut self) -> Result<Exchange, PipelineError> {
        self.close();
        let thread = self.thread.take().ok_or(PipelineError::AlreadyStopped)?;
        thread
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("matching".to_string()))
    }

    fn close(&self) {
        let mut open = self.handle.gate.write();
        if *open {
            *open = false;
            // Every admitted command is already ahead of the marker
            let _ = self.handle.sender.send(Envelope::Shutdown);
        }
    }
}

impl Drop for InputSequencer {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.close();
            let _ = thread.join();
        }
    }
}

/// Main event loop - processes commands sequentially
fn run(
    mut exchange: Exchange,
    receiver: Receiver<Envelope>,
    counters: Arc<Counters>,
    pin: Option<usize>,
) -> Exchange {
    utils::pin_matching_thread(pin);
    tracing::info!(currency_pairs = ?exchange.currency_pairs(), "Input sequencer started");

    let mut sequence = 0u64;
    while let Ok(envelope) = receiver.recv() {
        let (command, reply) = match envelope {
            Envelope::Command { command, reply } => (command, reply),
            Envelope::Shutdown => break,
        };

        sequence += 1;
        let order_id = command.order_id().clone();
        let result = exchange.execute(command);

        match &result {
            Ok(outcome) => {
                tracing::trace!(sequence, order_id = %order_id, ?outcome, "Command processed");
            }
            Err(ExchangeError::Rejected(reason)) => {
                tracing::debug!(sequence, order_id = %order_id, %reason, "Command rejected by exchange");
            }
            Err(error @ ExchangeError::EventsUndelivered(_)) => {
                tracing::error!(sequence, order_id = %order_id, %error, "Command applied, events not delivered");
            }
            Err(error) => {
                tracing::warn!(sequence, order_id = %order_id, %error, "Command failed");
            }
        }

        counters.processed.fetch_add(1, Ordering::Relaxed);
        // The producer may have dropped its ticket
        let _ = reply.send(CommandReceipt { sequence, result });
    }

    tracing::info!(processed = sequence, "Input sequencer stopped");
    exchange
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::engine::CancelOutcome;
    use crate::numeric::{Price, Volume};
    use crate::pipeline::{CancelOrder, PlaceOrder};

    fn start(capacity: usize) -> InputSequencer {
        let config = ExchangeConfig::coin_exchange().with_input_capacity(capacity);
        let exchange = Exchange::detached(&config).unwrap();
        InputSequencer::start(exchange, &config).unwrap()
    }

    fn bid(id: &str, price: i64) -> PlaceOrder {
        PlaceOrder::limit(
            id,
            "1234",
            "BTCUSD",
            Side::Buy,
            Price::from_integer(price).unwrap(),
            Volume::from_integer(1).unwrap(),
        )
    }

    #[test]
    fn test_sequences_in_admission_order() {
        let sequencer = start(16);
        let handle = sequencer.handle();

        let tickets: Vec<_> = (1..=5)
            .map(|i| handle.submit(bid(&i.to_string(), 100 + i)).unwrap())
            .collect();
        let sequences: Vec<_> = tickets
            .into_iter()
            .map(|t| t.wait().unwrap().sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

        let exchange = sequencer.shutdown().unwrap();
        assert_eq!(exchange.book(&"BTCUSD".into()).unwrap().bid_count(), 5);
    }

    #[test]
    fn test_validation_happens_before_admission() {
        let sequencer = start(16);
        let handle = sequencer.handle();

        let err = handle.submit(CancelOrder::new("1", "1", "ETHUSD")).unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::UnsupportedCurrencyPair(_))));

        let stats = handle.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.admitted, 0);
        sequencer.shutdown().unwrap();
    }

    #[test]
    fn test_cancel_outcome_is_returned() {
        let sequencer = start(16);
        let handle = sequencer.handle();

        handle.submit(bid("1", 100)).unwrap().wait().unwrap();
        let receipt = handle
            .submit(CancelOrder::new("1", "1234", "BTCUSD"))
            .unwrap()
            .wait()
            .unwrap();
        assert!(matches!(
            receipt.result,
            Ok(CommandOutcome::Cancel(CancelOutcome::Cancelled(_)))
        ));

        let again = handle
            .submit(CancelOrder::new("1", "1234", "BTCUSD"))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(again.result, Ok(CommandOutcome::Cancel(CancelOutcome::NotFound)));
        sequencer.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_drains_and_closes_admission() {
        let sequencer = start(1024);
        let handle = sequencer.handle();

        let tickets: Vec<_> = (0..200)
            .map(|i| handle.submit(bid(&format!("o{i}"), 100)).unwrap())
            .collect();

        let exchange = sequencer.shutdown().unwrap();
        assert_eq!(exchange.book(&"BTCUSD".into()).unwrap().bid_count(), 200);
        for ticket in tickets {
            assert!(ticket.wait().unwrap().result.is_ok());
        }

        assert!(!handle.is_open());
        assert_eq!(handle.submit(bid("late", 100)).unwrap_err(), SubmitError::Closed);
    }

    #[test]
    fn test_concurrent_producers_each_processed_once() {
        let sequencer = start(64);

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let handle = sequencer.handle();
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            handle
                                .submit(bid(&format!("p{p}-{i}"), 100 + i))
                                .unwrap()
                                .wait()
                                .unwrap()
                                .sequence
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut sequences: Vec<u64> = producers
            .into_iter()
            .flat_map(|p| p.join().unwrap())
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=200).collect::<Vec<_>>());

        let exchange = sequencer.shutdown().unwrap();
        assert_eq!(exchange.book(&"BTCUSD".into()).unwrap().bid_count(), 200);
    }
}
