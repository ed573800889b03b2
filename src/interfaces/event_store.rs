// ============================================================================
// Event Store Interface
// Durable, append-only storage behind the journaler
// ============================================================================

use crate::journal::{JournalError, JournalRecord};

/// Append-only record storage
pub trait EventStore: Send + 'static {
    /// Append one record after every record written so far
    fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError>;

    /// Make every appended record durable
    fn flush(&mut self) -> Result<(), JournalError>;

    /// Read every stored record in append order
    fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError>;
}
