//! Offline scan queue.
//!
//! Scans made while the backend is unreachable are captured locally and
//! replayed in arrival order once connectivity returns. The queue state here
//! is the in-memory view; durability comes from the [`crate::journal`]
//! backing it.

use crate::types::{ScanMethod, StaffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a queued offline scan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueuedScanId(Uuid);

impl QueuedScanId {
    /// Creates a new random identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueuedScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueuedScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sync lifecycle of a queued scan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Waiting for a sync round
    Pending,
    /// Currently being replayed against the backend
    Syncing,
    /// Replayed and committed
    Synced,
    /// Gave up after the bounded retry policy; retained for operator export
    Failed,
}

/// A scan captured while offline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedScan {
    /// Unique identifier
    pub id: QueuedScanId,
    /// Raw credential payload exactly as presented
    pub raw_payload: String,
    /// Input channel of the original presentation
    pub method: ScanMethod,
    /// Operator who ran the scan
    pub staff_id: StaffId,
    /// Local capture timestamp
    pub queued_at: DateTime<Utc>,
    /// Sync lifecycle state
    pub status: SyncStatus,
    /// Completed sync attempts so far
    pub attempts: u32,
}

impl QueuedScan {
    /// Capture a new pending entry.
    #[must_use]
    pub fn new(
        raw_payload: impl Into<String>,
        method: ScanMethod,
        staff_id: StaffId,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QueuedScanId::new(),
            raw_payload: raw_payload.into(),
            method,
            staff_id,
            queued_at,
            status: SyncStatus::Pending,
            attempts: 0,
        }
    }
}

/// Aggregate result of one sync round.
///
/// A partial sync is a partial summary, not an overall failure: `blocked`
/// entries resolved against current backend state (expected; e.g., refunded
/// while offline) and `failed` entries hit transient errors and either stay
/// pending or, past the retry bound, are retained as failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncSummary {
    /// Entries this round attempted
    pub total: u32,
    /// Entries committed against the backend
    pub synced: u32,
    /// Entries that resolved as blocked under current state
    pub blocked: u32,
    /// Entries that hit transient failures this round
    pub failed: u32,
}

/// FIFO queue of offline scans awaiting sync.
#[derive(Clone, Debug, Default)]
pub struct OfflineQueue {
    entries: VecDeque<QueuedScan>,
}

impl OfflineQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the queue from journal contents (startup restore).
    ///
    /// Entries that were mid-sync when the process died go back to pending.
    pub fn restore(&mut self, mut entries: Vec<QueuedScan>) {
        entries.sort_by_key(|e| e.queued_at);
        for mut entry in entries {
            if entry.status == SyncStatus::Syncing {
                entry.status = SyncStatus::Pending;
            }
            self.entries.push_back(entry);
        }
    }

    /// Append a captured scan
    pub fn push(&mut self, scan: QueuedScan) {
        self.entries.push_back(scan);
    }

    /// The oldest pending entry (strict FIFO)
    #[must_use]
    pub fn next_pending(&self) -> Option<&QueuedScan> {
        self.entries
            .iter()
            .find(|e| e.status == SyncStatus::Pending)
    }

    /// Mutable access to an entry by id
    pub fn get_mut(&mut self, id: QueuedScanId) -> Option<&mut QueuedScan> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Remove an entry by id, returning it
    pub fn remove(&mut self, id: QueuedScanId) -> Option<QueuedScan> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        self.entries.remove(idx)
    }

    /// Entries waiting for sync
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == SyncStatus::Pending)
            .count()
    }

    /// Permanently-failed entries retained for export
    #[must_use]
    pub fn failed(&self) -> impl Iterator<Item = &QueuedScan> {
        self.entries
            .iter()
            .filter(|e| e.status == SyncStatus::Failed)
    }

    /// Number of permanently-failed entries
    #[must_use]
    pub fn failed_len(&self) -> usize {
        self.failed().count()
    }

    /// Total entries currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all entries in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &QueuedScan> {
        self.entries.iter()
    }
}
