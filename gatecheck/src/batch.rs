//! Batch approval queue.
//!
//! In batch mode, individually-validated scans accumulate for one supervised
//! bulk approval instead of committing immediately; a tour guide presents
//! twenty tickets, staff eyeballs the list, one tap admits the group.
//! Nothing in the queue has been committed, so clearing it needs no undo.

use crate::types::{BatchEntry, TicketId};

/// Why an entry was rejected from the batch queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchRejection {
    /// The same ticket is already waiting in the queue
    DuplicateInQueue,
    /// Batch mode is not active
    BatchModeOff,
}

impl BatchRejection {
    /// Stable wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateInQueue => "duplicate_in_queue",
            Self::BatchModeOff => "batch_mode_off",
        }
    }
}

/// Accumulates provisionally-valid scans for a supervised bulk approve.
#[derive(Clone, Debug, Default)]
pub struct BatchCollector {
    enabled: bool,
    entries: Vec<BatchEntry>,
}

impl BatchCollector {
    /// Create a collector with batch mode off
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether batch mode is active
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Turn batch mode on or off.
    ///
    /// Disabling discards all pending entries; none of them were committed,
    /// so nothing needs to be undone.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.entries.clear();
        }
    }

    /// Queue a provisionally-valid scan for approval.
    ///
    /// Duplicates are detected by ticket identity, not scan-attempt
    /// identity: the same ticket presented twice while batch mode is on is
    /// rejected the second time.
    ///
    /// # Errors
    ///
    /// [`BatchRejection::BatchModeOff`] when batch mode is inactive,
    /// [`BatchRejection::DuplicateInQueue`] when the ticket is already queued.
    pub fn add(&mut self, entry: BatchEntry) -> Result<(), BatchRejection> {
        if !self.enabled {
            return Err(BatchRejection::BatchModeOff);
        }
        if self.contains(entry.ticket_id) {
            return Err(BatchRejection::DuplicateInQueue);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Whether a ticket is waiting in the queue
    #[must_use]
    pub fn contains(&self, ticket_id: TicketId) -> bool {
        self.entries.iter().any(|e| e.ticket_id == ticket_id)
    }

    /// Manually remove one entry
    pub fn remove(&mut self, ticket_id: TicketId) -> Option<BatchEntry> {
        let idx = self.entries.iter().position(|e| e.ticket_id == ticket_id)?;
        Some(self.entries.remove(idx))
    }

    /// Discard all pending entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Take every entry out for approval, leaving the queue empty
    pub fn drain(&mut self) -> Vec<BatchEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Entries currently waiting
    #[must_use]
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Number of waiting entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
