//! Actions for the scan coordinator.
//!
//! Commands arrive from the outside (device I/O, operator UI, the sync
//! worker); events are produced by effects and fed back into the reducer.
//! Every scan attempt ends in exactly one terminal event (`ScanCompleted`,
//! `ScanIgnored`, or `ScanAbandoned`), which is what the gate facade waits
//! for.

use crate::overrides::OverrideEnd;
use crate::queue::{QueuedScan, QueuedScanId, SyncSummary};
use crate::types::{
    AttemptId, BatchOutcome, BlockReason, CapacityStatus, EventId, OverrideCategory, ReentryMode,
    ScanMethod, ScanResult, StaffId, Ticket, TicketId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_macros::Action;

/// Where a scan attempt came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanSource {
    /// A live presentation at the gate
    Live,
    /// A replay of an offline-queued scan during sync
    Queue(QueuedScanId),
}

impl ScanSource {
    /// Whether this attempt is a live presentation
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// How one queued entry resolved during a sync round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryResolution {
    /// Committed against the backend
    Synced,
    /// Resolved as blocked under current backend state (expected; surfaced)
    Blocked(BlockReason),
    /// Transient failure; will retry on a later round
    Retrying,
    /// Exhausted the retry bound; retained for operator export
    Failed,
}

/// One ticket admitted by a batch approval, for capacity bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmittedEntry {
    /// Admitted ticket
    pub ticket_id: TicketId,
    /// Event the admission counts against
    pub event_id: EventId,
    /// Tier the admission counts against
    pub tier: String,
}

/// Actions for the scan coordinator.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)] // Ticket payloads dominate; actions are transient
pub enum ScanAction {
    // ========== Commands ==========
    /// Process one presented credential end to end
    #[command]
    ProcessScan {
        /// Correlates this attempt's terminal event
        attempt_id: AttemptId,
        /// Raw credential payload
        raw_payload: String,
        /// Input channel
        method: ScanMethod,
        /// Operator running the scanner
        staff_id: StaffId,
        /// Live input or offline-queue replay
        source: ScanSource,
    },

    /// Operator supplied the mandatory reason for an override commit
    #[command]
    SupplyOverrideReason {
        /// Attempt suspended in `AwaitingOverrideReason`
        attempt_id: AttemptId,
        /// Mandatory reason (empty reasons are ignored)
        reason: String,
        /// Optional free-form notes
        notes: Option<String>,
    },

    /// Operator cancelled the override prompt; abandon the attempt
    #[command]
    CancelOverrideReason {
        /// Attempt suspended in `AwaitingOverrideReason`
        attempt_id: AttemptId,
    },

    /// Activate (or replace) the process-wide override session
    #[command]
    ActivateOverride {
        /// Staff member taking accountability
        staff_id: StaffId,
    },

    /// Deactivate the override session
    #[command]
    DeactivateOverride,

    /// Change the venue re-entry policy
    #[command]
    SetReentryMode {
        /// New policy
        mode: ReentryMode,
    },

    /// Toggle batch mode (disabling clears the batch queue)
    #[command]
    SetBatchMode {
        /// New state
        enabled: bool,
    },

    /// Remove one entry from the batch queue
    #[command]
    RemoveBatchEntry {
        /// Ticket to remove
        ticket_id: TicketId,
    },

    /// Discard all batch queue entries
    #[command]
    ClearBatch,

    /// Re-validate and commit everything in the batch queue
    #[command]
    ApproveBatch {
        /// Staff member approving the batch (recorded in the scan log)
        staff_id: StaffId,
    },

    /// Start a sync round over the offline queue
    #[command]
    SyncQueue,

    /// Connectivity signal update
    #[command]
    SetConnectivity {
        /// New connectivity state
        online: bool,
    },

    /// Restore journal contents into the queue at startup
    #[command]
    RestoreQueue {
        /// Persisted entries
        entries: Vec<QueuedScan>,
    },

    /// Release a debounce key after the post-result cool-down
    #[command]
    ReleaseDebounce {
        /// The raw-payload key to release
        key: String,
    },

    /// The operator never supplied an override reason in time
    #[command]
    OverrideReasonTimeout {
        /// Attempt to abandon
        attempt_id: AttemptId,
    },

    // ========== Events ==========
    /// Ticket and capacity lookup came back
    #[event]
    LookupSucceeded {
        /// Attempt the lookup belongs to
        attempt_id: AttemptId,
        /// Resolved ticket
        ticket: Ticket,
        /// Backend capacity snapshot (seeds the local cache)
        capacity: CapacityStatus,
    },

    /// Ticket or capacity lookup failed
    #[event]
    LookupFailed {
        /// Attempt the lookup belongs to
        attempt_id: AttemptId,
        /// True for a definitive not-found; false for a transient failure
        not_found: bool,
        /// Failure detail for logs
        detail: String,
    },

    /// Commit write succeeded
    #[event]
    CommitSucceeded {
        /// Attempt that committed
        attempt_id: AttemptId,
        /// Ticket as returned by the backend after the write
        ticket: Ticket,
    },

    /// Commit write failed
    #[event]
    CommitFailed {
        /// Attempt that failed
        attempt_id: AttemptId,
        /// Failure detail
        detail: String,
        /// True when the audit rows were already written (override path)
        audit_written: bool,
    },

    /// Batch approval finished
    #[event]
    BatchApproved {
        /// Processed/error counts for the operator
        outcome: BatchOutcome,
        /// Admissions to advance the capacity cache with
        admitted: Vec<AdmittedEntry>,
    },

    /// Terminal: the attempt produced a result
    #[event]
    ScanCompleted {
        /// Attempt that finished
        attempt_id: AttemptId,
        /// The immutable outcome
        result: ScanResult,
    },

    /// Terminal: duplicate rapid scan, silently dropped
    #[event]
    ScanIgnored {
        /// Attempt that was dropped
        attempt_id: AttemptId,
    },

    /// Terminal: override prompt cancelled or timed out, state untouched
    #[event]
    ScanAbandoned {
        /// Attempt that was abandoned
        attempt_id: AttemptId,
    },

    /// A block is override-eligible; processing suspended for a reason
    #[event]
    OverrideReasonRequired {
        /// Suspended attempt
        attempt_id: AttemptId,
        /// Category that would be bypassed
        category: OverrideCategory,
        /// The ticket in question, for the operator prompt
        ticket: Ticket,
    },

    /// An override session was activated or replaced
    #[event]
    OverrideActivated {
        /// Activating staff member
        staff_id: StaffId,
        /// When the session will expire
        expires_at: DateTime<Utc>,
    },

    /// The override session ended
    #[event]
    OverrideDeactivated {
        /// Why it ended
        end: OverrideEnd,
    },

    /// One offline-queue entry resolved during sync
    #[event]
    QueueEntryResolved {
        /// The entry
        id: QueuedScanId,
        /// How it resolved
        resolution: EntryResolution,
    },

    /// A sync round finished
    #[event]
    SyncCompleted {
        /// Aggregate counters for the round
        summary: SyncSummary,
    },
}
