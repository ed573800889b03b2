// ============================================================================
// Exchange Configuration
// Supported currency pairs, market data depth and pipeline sizing
// ============================================================================

use super::ids::CurrencyPair;
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_DEPTH_LEVELS: usize = 10;
pub const DEFAULT_INPUT_CAPACITY: usize = 65_536;
pub const DEFAULT_OUTPUT_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one currency pair must be configured")]
    NoCurrencyPairs,

    #[error("currency pair symbol cannot be empty")]
    EmptyCurrencyPair,

    #[error("currency pair {0} configured more than once")]
    DuplicateCurrencyPair(CurrencyPair),

    #[error("depth levels must be positive")]
    ZeroDepthLevels,

    #[error("{0} capacity must be positive")]
    ZeroCapacity(&'static str),

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(&'static str),
}

// ============================================================================
// Exchange Config
// ============================================================================

/// Everything needed to build an [`Exchange`](crate::engine::Exchange) and the
/// pipeline around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// One matching engine is created per pair
    pub currency_pairs: Vec<CurrencyPair>,

    /// Number of price levels per side carried by `Depth` events
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,

    /// Bounded capacity of the input sequencer channel
    #[serde(default = "default_input_capacity")]
    pub input_capacity: usize,

    /// Bounded capacity of each subscriber channel on the output bus
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,

    /// Backoff applied when a subscriber fails to handle an event
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Optional: core to pin the matching thread to (feature `numa`)
    #[serde(default)]
    pub pin_matching_thread: Option<usize>,
}

fn default_depth_levels() -> usize {
    DEFAULT_DEPTH_LEVELS
}

fn default_input_capacity() -> usize {
    DEFAULT_INPUT_CAPACITY
}

fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

impl ExchangeConfig {
    /// Create a new configuration with required parameters
    pub fn new<I, P>(currency_pairs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<CurrencyPair>,
    {
        Self {
            currency_pairs: currency_pairs.into_iter().map(Into::into).collect(),
            depth_levels: DEFAULT_DEPTH_LEVELS,
            input_capacity: DEFAULT_INPUT_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            retry: RetryPolicy::default(),
            pin_matching_thread: None,
        }
    }

    /// Builder method: Set depth levels per side
    pub fn with_depth_levels(mut self, levels: usize) -> Self {
        self.depth_levels = levels;
        self
    }

    /// Builder method: Set input sequencer capacity
    pub fn with_input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self
    }

    /// Builder method: Set per-subscriber output capacity
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }

    /// Builder method: Set subscriber retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method: Pin the matching thread to a core
    pub fn with_pinned_matching_thread(mut self, core: usize) -> Self {
        self.pin_matching_thread = Some(core);
        self
    }

    pub fn supports(&self, currency_pair: &CurrencyPair) -> bool {
        self.currency_pairs.contains(currency_pair)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currency_pairs.is_empty() {
            return Err(ConfigError::NoCurrencyPairs);
        }

        let mut seen = HashSet::new();
        for pair in &self.currency_pairs {
            if pair.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyCurrencyPair);
            }
            if !seen.insert(pair) {
                return Err(ConfigError::DuplicateCurrencyPair(pair.clone()));
            }
        }

        if self.depth_levels == 0 {
            return Err(ConfigError::ZeroDepthLevels);
        }
        if self.input_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("input"));
        }
        if self.output_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("output"));
        }

        self.retry.validate()
    }
}

// ============================================================================
// Preset Configurations
// ============================================================================

impl ExchangeConfig {
    /// Crypto-currency exchange trading BTC against USD, LTC and DOGE
    pub fn coin_exchange() -> Self {
        Self::new(["BTCUSD", "BTCLTC", "BTCDOGE"])
    }
}
