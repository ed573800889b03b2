// ============================================================================
// Journal Record
// Versioned persistence schema and its line codec
// ============================================================================

use super::JournalError;
use crate::interfaces::{OutputEvent, SequencedEvent};
use chrono::{DateTime, Utc};
use crc32c::crc32c;
use serde::{Deserialize, Serialize};

/// Schema version written by this build
pub const JOURNAL_VERSION: u32 = 1;

/// One journaled output event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub version: u32,
    /// Position in the output stream of the run that wrote it
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: OutputEvent,
}

impl JournalRecord {
    pub fn new(sequence: u64, event: OutputEvent) -> Self {
        Self {
            version: JOURNAL_VERSION,
            sequence,
            recorded_at: Utc::now(),
            event,
        }
    }

    pub fn from_event(event: &SequencedEvent) -> Self {
        Self::new(event.sequence, event.event.clone())
    }

    /// Encode as a single newline-terminated line
    pub fn encode(&self) -> Result<String, JournalError> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{:08x} {}\n", crc32c(json.as_bytes()), json))
    }

    /// Decode one line without its terminating newline.
    ///
    /// `line` is 1-based and only used for error reporting.
    pub fn decode(text: &str, line: usize) -> Result<Self, JournalError> {
        let (checksum, json) = text.split_once(' ').ok_or_else(|| JournalError::Corrupt {
            line,
            reason: "missing checksum separator".to_string(),
        })?;

        let stored = u32::from_str_radix(checksum, 16).map_err(|e| JournalError::Corrupt {
            line,
            reason: format!("bad checksum field: {e}"),
        })?;
        let computed = crc32c(json.as_bytes());
        if stored != computed {
            return Err(JournalError::Checksum {
                line,
                stored,
                computed,
            });
        }

        let record: JournalRecord = serde_json::from_str(json).map_err(|e| JournalError::Corrupt {
            line,
            reason: e.to_string(),
        })?;
        if record.version != JOURNAL_VERSION {
            return Err(JournalError::UnsupportedVersion {
                line,
                version: record.version,
            });
        }
        Ok(record)
    }
}

/// Decode a whole journal.
///
/// An unterminated last line is a torn write and is skipped with a warning.
/// Any other bad line fails the whole read.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<JournalRecord>, JournalError> {
    let mut records = Vec::new();
    let mut rest = bytes;
    let mut line = 0;

    while !rest.is_empty() {
        line += 1;
        let Some(end) = rest.iter().position(|&b| b == b'\n') else {
            tracing::warn!(line, bytes = rest.len(), "Ignoring torn journal tail");
            break;
        };

        let text = std::str::from_utf8(&rest[..end]).map_err(|e| JournalError::Corrupt {
            line,
            reason: e.to_string(),
        })?;
        records.push(JournalRecord::decode(text, line)?);
        rest = &rest[end + 1..];
    }

    Ok(records)
}
