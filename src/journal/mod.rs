// ============================================================================
// Journal Module
// Durable record of the output event stream and book recovery from it
// ============================================================================

//! Every output event can be journaled as one checksummed line:
//!
//! ```text
//! <crc32c as 8 hex digits> <JournalRecord as JSON>\n
//! ```
//!
//! The checksum covers the JSON text. Recovery takes the last
//! `LimitOrderBook` snapshot of each pair and rebuilds the books from it.

pub mod journaler;
pub mod record;
pub mod recovery;
pub mod store;

pub use journaler::Journaler;
pub use record::{decode_all, JournalRecord, JOURNAL_VERSION};
pub use recovery::{recover_books, replay, restore_exchange};
pub use store::{FileEventStore, InMemoryEventStore};

use crate::engine::ExchangeError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Checksum mismatch on line {line}: stored {stored:08x}, computed {computed:08x}")]
    Checksum { line: usize, stored: u32, computed: u32 },

    #[error("Unsupported record version {version} on line {line}")]
    UnsupportedVersion { line: usize, version: u32 },

    #[error("Corrupt record on line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Failed to restore book: {0}")]
    Restore(#[from] ExchangeError),
}

impl From<serde_json::Error> for JournalError {
    fn from(error: serde_json::Error) -> Self {
        JournalError::Serialization(error.to_string())
    }
}
