// ============================================================================
// Event Stores
// Append-only file store and an in-memory store sharing one line format
// ============================================================================

use super::{decode_all, JournalError, JournalRecord};
use crate::interfaces::EventStore;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── File Store ──────────────────────────────────────────────────────

/// Bytes of whole lines held in memory before they are written out
pub const DEFAULT_WRITE_BUFFER: usize = 64 * 1024;

/// Journal file opened for append.
///
/// Records are buffered until [`flush`](EventStore::flush), which also syncs
/// the file data to disk. Only whole lines are committed: a write that fails
/// part way is cut back to the last complete line before anything else is
/// written.
pub struct FileEventStore {
    path: PathBuf,
    file: File,
    /// Encoded lines not yet written to the file
    pending: Vec<u8>,
    write_buffer: usize,
    /// File length covering complete lines only
    committed: u64,
    /// A failed write may have left bytes past `committed`
    torn: bool,
    appended: u64,
}

impl FileEventStore {
    /// Open or create the journal at `path`, creating parent directories.
    ///
    /// A torn last line left by a crash is cut off so new records start on a
    /// fresh line.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Self::truncate_torn_tail(&path, &file)?;
        let committed = file.metadata()?.len();

        tracing::info!(path = %path.display(), bytes = committed, "Journal opened");
        Ok(Self {
            path,
            file,
            pending: Vec::new(),
            write_buffer: DEFAULT_WRITE_BUFFER,
            committed,
            torn: false,
            appended: 0,
        })
    }

    /// Builder method: Write out once this many bytes are pending
    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer = bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle
    pub fn appended(&self) -> u64 {
        self.appended
    }

    fn truncate_torn_tail(path: &Path, file: &File) -> Result<(), JournalError> {
        let contents = fs::read(path)?;
        if contents.is_empty() || contents.ends_with(b"\n") {
            return Ok(());
        }

        let keep = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |newline| newline + 1);
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = contents.len() - keep,
            "Truncating torn journal tail"
        );
        file.set_len(keep as u64)?;
        file.sync_data()?;
        Ok(())
    }

    /// Write every pending line. On failure the pending lines are kept and
    /// the file is cut back to `committed`.
    fn write_pending(&mut self) -> Result<(), JournalError> {
        if self.torn {
            self.file.set_len(self.committed)?;
            self.torn = false;
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        if let Err(error) = self.file.write_all(&self.pending) {
            match self.file.set_len(self.committed) {
                Ok(()) => {}
                Err(truncate) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        committed = self.committed,
                        error = %truncate,
                        "Could not cut back failed journal write"
                    );
                    self.torn = true;
                }
            }
            return Err(error.into());
        }

        self.committed += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

impl EventStore for FileEventStore {
    fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError> {
        let line = record.encode()?;
        let mark = self.pending.len();
        self.pending.extend_from_slice(line.as_bytes());

        if self.pending.len() >= self.write_buffer {
            if let Err(error) = self.write_pending() {
                // The caller retries this record
                self.pending.truncate(mark);
                return Err(error);
            }
        }
        self.appended += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), JournalError> {
        self.write_pending()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Reads what is on disk; records still buffered are not included.
    fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError> {
        decode_all(&fs::read(&self.path)?)
    }
}

impl Drop for FileEventStore {
    fn drop(&mut self) {
        if let Err(error) = self.write_pending() {
            tracing::warn!(path = %self.path.display(), %error, "Pending journal lines lost on close");
        }
    }
}

// ── In-Memory Store ─────────────────────────────────────────────────

/// Store keeping encoded lines in memory.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// journaler owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    bytes: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<Mutex<u64>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw journal contents
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn flush_count(&self) -> u64 {
        *self.flushes.lock()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError> {
        let line = record.encode()?;
        self.bytes.lock().extend_from_slice(line.as_bytes());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), JournalError> {
        *self.flushes.lock() += 1;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError> {
        decode_all(&self.bytes.lock())
    }
}
