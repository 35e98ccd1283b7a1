//! Durable backing for the offline queue.
//!
//! Enqueue must survive a process crash: a guest admitted offline whose scan
//! evaporates on restart is a silent hole in the audit trail. The journal is
//! a small local snapshot file rewritten through a temp-file rename on every
//! mutation; queue sizes are bounded by how long a gate realistically stays
//! offline, so rewrite cost is irrelevant next to correctness.

use crate::queue::{QueuedScan, QueuedScanId};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    /// Filesystem failure
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure
    #[error("journal serialization error: {0}")]
    Serialization(String),
}

/// Durable store for queued offline scans.
///
/// Implementations must make `append` survive a crash once it returns.
#[async_trait]
pub trait ScanJournal: Send + Sync {
    /// Persist a newly-captured scan.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when the entry could not be made durable.
    async fn append(&self, scan: &QueuedScan) -> Result<(), JournalError>;

    /// Persist a status/attempt change for an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when the change could not be made durable.
    async fn update(&self, scan: &QueuedScan) -> Result<(), JournalError>;

    /// Drop a fully-synced entry.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when the removal could not be made durable.
    async fn remove(&self, id: QueuedScanId) -> Result<(), JournalError>;

    /// Load every persisted entry (startup restore).
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when the snapshot cannot be read or parsed.
    async fn load(&self) -> Result<Vec<QueuedScan>, JournalError>;
}

// ============================================================================
// In-memory journal
// ============================================================================

/// Volatile journal for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<QueuedScan>>,
}

impl MemoryJournal {
    /// Create an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueuedScan>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ScanJournal for MemoryJournal {
    async fn append(&self, scan: &QueuedScan) -> Result<(), JournalError> {
        self.lock().push(scan.clone());
        Ok(())
    }

    async fn update(&self, scan: &QueuedScan) -> Result<(), JournalError> {
        let mut entries = self.lock();
        if let Some(existing) = entries.iter_mut().find(|e| e.id == scan.id) {
            *existing = scan.clone();
        }
        Ok(())
    }

    async fn remove(&self, id: QueuedScanId) -> Result<(), JournalError> {
        self.lock().retain(|e| e.id != id);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<QueuedScan>, JournalError> {
        Ok(self.lock().clone())
    }
}

// ============================================================================
// File journal
// ============================================================================

/// File-backed journal.
///
/// Keeps an in-memory mirror and persists the whole snapshot as JSON through
/// a write-to-temp-then-rename, so the file on disk is always a complete,
/// parseable snapshot. A missing file is an empty queue, not an error.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    entries: Mutex<Vec<QueuedScan>>,
}

impl FileJournal {
    /// Open a journal at `path`, reading any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when an existing snapshot cannot be read or
    /// parsed. A corrupt snapshot is surfaced, not silently discarded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| JournalError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(JournalError::Io(e)),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueuedScan>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Write the current snapshot atomically.
    fn persist(&self, entries: &[QueuedScan]) -> Result<(), JournalError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| JournalError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl ScanJournal for FileJournal {
    async fn append(&self, scan: &QueuedScan) -> Result<(), JournalError> {
        let mut entries = self.lock();
        entries.push(scan.clone());
        self.persist(&entries)
    }

    async fn update(&self, scan: &QueuedScan) -> Result<(), JournalError> {
        let mut entries = self.lock();
        if let Some(existing) = entries.iter_mut().find(|e| e.id == scan.id) {
            *existing = scan.clone();
        }
        self.persist(&entries)
    }

    async fn remove(&self, id: QueuedScanId) -> Result<(), JournalError> {
        let mut entries = self.lock();
        entries.retain(|e| e.id != id);
        self.persist(&entries)
    }

    async fn load(&self) -> Result<Vec<QueuedScan>, JournalError> {
        Ok(self.lock().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::queue::SyncStatus;
    use crate::types::{ScanMethod, StaffId};
    use chrono::Utc;

    fn scan(payload: &str) -> QueuedScan {
        QueuedScan::new(payload, ScanMethod::Qr, StaffId::new(), Utc::now())
    }

    #[tokio::test]
    async fn memory_journal_roundtrip() {
        let journal = MemoryJournal::new();
        let entry = scan("a");
        journal.append(&entry).await.unwrap();

        let mut updated = entry.clone();
        updated.status = SyncStatus::Failed;
        journal.update(&updated).await.unwrap();

        let loaded = journal.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, SyncStatus::Failed);

        journal.remove(entry.id).await.unwrap();
        assert!(journal.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let entry = scan("offline-1");
        {
            let journal = FileJournal::open(&path).unwrap();
            journal.append(&entry).await.unwrap();
            journal.append(&scan("offline-2")).await.unwrap();
        }

        let reopened = FileJournal::open(&path).unwrap();
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, entry.id);
    }

    #[tokio::test]
    async fn file_journal_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path().join("absent.json")).unwrap();
        assert!(journal.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_journal_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let entry = scan("a");
        {
            let journal = FileJournal::open(&path).unwrap();
            journal.append(&entry).await.unwrap();
            journal.remove(entry.id).await.unwrap();
        }

        let reopened = FileJournal::open(&path).unwrap();
        assert!(reopened.load().await.unwrap().is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            FileJournal::open(&path),
            Err(JournalError::Serialization(_))
        ));
    }
}
