// ============================================================================
// Output Event Bus
// Fans every output event out to independent subscriber threads
// ============================================================================

use super::retry::RetryPolicy;
use crate::interfaces::{
    EventBatch, EventHandler, EventSubscriber, OutputEvent, PublishError, SequencedEvent,
    SharedEvent, SubscriberError,
};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("output bus is closed")]
    Closed,

    #[error("subscriber {0} stopped consuming")]
    SubscriberGone(String),

    #[error("subscriber worker {0} panicked")]
    WorkerPanicked(String),

    #[error("failed to spawn subscriber worker: {0}")]
    Spawn(#[from] std::io::Error),
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberStats {
    pub name: String,
    pub processed: u64,
    pub retries: u64,
    pub last_sequence: Option<u64>,
    /// Events were abandoned by [`OutputBus::abort`]
    pub aborted: bool,
    pub shutdown_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub subscribers: Vec<SubscriberStats>,
}

// ============================================================================
// Publisher
// ============================================================================

struct Route {
    name: String,
    sender: Sender<SharedEvent>,
    /// Cleared once the worker is found gone; the route is skipped after that
    alive: bool,
}

struct FanOut {
    next_sequence: u64,
    routes: Vec<Route>,
    closed: bool,
}

struct BusShared {
    fan_out: Mutex<FanOut>,
    published: AtomicU64,
    /// Events handled so far, one counter per subscriber
    progress: Vec<Arc<AtomicU64>>,
    abort: Arc<AtomicBool>,
}

/// Producer side of the bus; usually installed as the exchange's event handler
#[derive(Clone)]
pub struct BusPublisher {
    shared: Arc<BusShared>,
}

impl BusPublisher {
    /// Publish one event, blocking while any subscriber buffer is full.
    ///
    /// Returns the event's global sequence number.
    pub fn publish(&self, event: OutputEvent) -> Result<u64, BusError> {
        let mut fan_out = self.shared.fan_out.lock();
        self.send_locked(&mut fan_out, event)
    }

    /// Publish a batch contiguously; no other batch interleaves with it.
    ///
    /// A dead subscriber does not stop delivery to the others: the whole
    /// batch still goes out and the first failure is returned afterwards.
    pub fn publish_batch<I>(&self, events: I) -> Result<(), BusError>
    where
        I: IntoIterator<Item = OutputEvent>,
    {
        let mut fan_out = self.shared.fan_out.lock();
        let mut outcome = Ok(());
        for event in events {
            if let Err(error) = self.send_locked(&mut fan_out, event) {
                if outcome.is_ok() {
                    outcome = Err(error);
                }
            }
        }
        outcome
    }

    /// Events published so far
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Acquire)
    }

    fn send_locked(&self, fan_out: &mut FanOut, event: OutputEvent) -> Result<u64, BusError> {
        if fan_out.closed {
            return Err(BusError::Closed);
        }

        fan_out.next_sequence += 1;
        let sequence = fan_out.next_sequence;
        let shared = Arc::new(SequencedEvent::new(sequence, event));

        for route in fan_out.routes.iter_mut().filter(|route| route.alive) {
            if route.sender.send(Arc::clone(&shared)).is_err() {
                route.alive = false;
                tracing::error!(subscriber = %route.name, sequence, "Subscriber worker gone, route closed");
            }
        }
        self.shared.published.store(sequence, Ordering::Release);

        match fan_out.routes.iter().find(|route| !route.alive) {
            Some(route) => Err(BusError::SubscriberGone(route.name.clone())),
            None => Ok(sequence),
        }
    }
}

impl From<BusError> for PublishError {
    fn from(error: BusError) -> Self {
        PublishError(error.to_string())
    }
}

impl EventHandler for BusPublisher {
    fn on_event(&self, event: OutputEvent) -> Result<(), PublishError> {
        self.publish(event)?;
        Ok(())
    }

    fn on_events(&self, events: EventBatch) -> Result<(), PublishError> {
        Ok(self.publish_batch(events)?)
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct OutputBusBuilder {
    capacity: usize,
    retry: RetryPolicy,
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

impl OutputBusBuilder {
    /// Builder method: Set subscriber retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method: Attach a subscriber
    pub fn subscriber(self, subscriber: impl EventSubscriber) -> Self {
        self.boxed_subscriber(Box::new(subscriber))
    }

    pub fn boxed_subscriber(mut self, subscriber: Box<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Spawn one worker thread per subscriber
    pub fn start(self) -> Result<OutputBus, BusError> {
        let abort = Arc::new(AtomicBool::new(false));
        let mut routes = Vec::with_capacity(self.subscribers.len());
        let mut progress = Vec::with_capacity(self.subscribers.len());
        let mut workers = Vec::with_capacity(self.subscribers.len());

        for subscriber in self.subscribers {
            let name = subscriber.name().to_string();
            let (sender, receiver) = bounded(self.capacity);
            let processed = Arc::new(AtomicU64::new(0));

            let worker = Worker {
                subscriber,
                receiver,
                retry: self.retry,
                processed: Arc::clone(&processed),
                abort: Arc::clone(&abort),
            };
            let thread = thread::Builder::new()
                .name(format!("bus-{name}"))
                .spawn(move || worker.run())?;

            routes.push(Route {
                name: name.clone(),
                sender,
                alive: true,
            });
            progress.push(processed);
            workers.push((name, thread));
        }

        tracing::info!(
            subscribers = ?workers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            capacity = self.capacity,
            "Output bus started"
        );

        let shared = Arc::new(BusShared {
            fan_out: Mutex::new(FanOut {
                next_sequence: 0,
                routes,
                closed: false,
            }),
            published: AtomicU64::new(0),
            progress,
            abort,
        });

        Ok(OutputBus {
            publisher: BusPublisher { shared },
            workers,
        })
    }
}

// ============================================================================
// Output Bus
// ============================================================================

/// Owns the subscriber workers. Stop it with [`shutdown`](OutputBus::shutdown)
/// to flush every pending event.
pub struct OutputBus {
    publisher: BusPublisher,
    workers: Vec<(String, JoinHandle<SubscriberStats>)>,
}

impl OutputBus {
    /// `capacity` bounds each subscriber's buffer
    pub fn builder(capacity: usize) -> OutputBusBuilder {
        OutputBusBuilder {
            capacity,
            retry: RetryPolicy::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn publisher(&self) -> BusPublisher {
        self.publisher.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.workers.len()
    }

    /// Block until every subscriber has handled every event published so far.
    ///
    /// Returns `false` on timeout.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let target = self.publisher.published();
        let deadline = Instant::now() + timeout;

        loop {
            let drained = self
                .publisher
                .shared
                .progress
                .iter()
                .all(|processed| processed.load(Ordering::Acquire) >= target);
            if drained {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop accepting events, deliver everything pending, run each
    /// subscriber's shutdown hook and return the final statistics.
    pub fn shutdown(self) -> Result<BusStats, BusError> {
        self.close();
        let stats = self.join()?;
        tracing::info!(published = stats.published, "Output bus stopped");
        Ok(stats)
    }

    /// Stop without delivering pending events
    pub fn abort(self) -> Result<BusStats, BusError> {
        self.publisher.shared.abort.store(true, Ordering::Release);
        self.close();
        let stats = self.join()?;
        tracing::warn!(published = stats.published, "Output bus aborted");
        Ok(stats)
    }

    fn close(&self) {
        let mut fan_out = self.publisher.shared.fan_out.lock();
        fan_out.closed = true;
        // Dropping the senders lets each worker finish its buffer and exit
        fan_out.routes.clear();
    }

    fn join(self) -> Result<BusStats, BusError> {
        let mut subscribers = Vec::with_capacity(self.workers.len());
        let mut panicked = None;
        for (name, thread) in self.workers {
            match thread.join() {
                Ok(stats) => subscribers.push(stats),
                Err(_) => {
                    tracing::error!(subscriber = %name, "Subscriber worker panicked");
                    panicked.get_or_insert(name);
                }
            }
        }
        if let Some(name) = panicked {
            return Err(BusError::WorkerPanicked(name));
        }

        Ok(BusStats {
            published: self.publisher.published(),
            subscribers,
        })
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    subscriber: Box<dyn EventSubscriber>,
    receiver: Receiver<SharedEvent>,
    retry: RetryPolicy,
    processed: Arc<AtomicU64>,
    abort: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) -> SubscriberStats {
        let mut stats = SubscriberStats {
            name: self.subscriber.name().to_string(),
            processed: 0,
            retries: 0,
            last_sequence: None,
            aborted: false,
            shutdown_error: None,
        };
        tracing::debug!(subscriber = %stats.name, "Subscriber worker started");

        while let Ok(event) = self.receiver.recv() {
            if !self.deliver(&event, &mut stats) {
                stats.aborted = true;
                break;
            }
            stats.processed += 1;
            stats.last_sequence = Some(event.sequence);
            self.processed.store(event.sequence, Ordering::Release);
        }

        if stats.aborted {
            return stats;
        }

        let subscriber = &mut self.subscriber;
        let shutdown = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_shutdown()))
            .unwrap_or_else(|payload| Err(panicked(&stats.name, payload)));
        if let Err(error) = shutdown {
            tracing::error!(subscriber = %stats.name, %error, "Subscriber shutdown failed");
            stats.shutdown_error = Some(error.to_string());
        }
        tracing::debug!(
            subscriber = %stats.name,
            processed = stats.processed,
            "Subscriber worker stopped"
        );
        stats
    }

    /// Hand one event to the subscriber until it succeeds. A panic counts as
    /// a failed attempt. Returns `false` only when the bus is aborted.
    fn deliver(&mut self, event: &SequencedEvent, stats: &mut SubscriberStats) -> bool {
        let mut attempt = 0u32;
        loop {
            if self.abort.load(Ordering::Acquire) {
                return false;
            }

            let subscriber = &mut self.subscriber;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event)))
                .unwrap_or_else(|payload| Err(panicked(&stats.name, payload)));
            let error = match outcome {
                Ok(()) => return true,
                Err(error) => error,
            };

            attempt = attempt.saturating_add(1);
            stats.retries += 1;
            let delay = self.retry.backoff(attempt);

            if self.retry.should_escalate(attempt) {
                tracing::error!(
                    subscriber = %stats.name,
                    sequence = event.sequence,
                    attempt,
                    %error,
                    "Subscriber keeps failing, bus is backing up"
                );
            } else {
                tracing::warn!(
                    subscriber = %stats.name,
                    sequence = event.sequence,
                    attempt,
                    ?delay,
                    %error,
                    "Subscriber failed, retrying"
                );
            }
            thread::sleep(delay);
        }
    }
}

fn panicked(subscriber: &str, payload: Box<dyn Any + Send>) -> SubscriberError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    SubscriberError::failed(subscriber, format!("panicked: {message}"))
}
