//! Coordinator state types.

use crate::batch::BatchCollector;
use crate::debounce::DebounceGuard;
use crate::overrides::OverrideSession;
use crate::queue::{OfflineQueue, QueuedScanId, SyncSummary};
use crate::rules::Evaluation;
use crate::scan::actions::ScanSource;
use crate::types::{
    AttemptId, BlockReason, CapacityStatus, EventId, OverrideCategory, ReentryMode, ScanAttempt,
    Ticket,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Where a pending scan sits in the per-attempt state machine.
///
/// Phases that resolve within one reducer step (verifying, debouncing,
/// queuing) never appear here; only phases that span an await: the backend
/// lookup, the operator-supplied override reason, and the commit write.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanPhase {
    /// Waiting for the ticket/capacity lookup to come back
    Checking,
    /// A rule blocked, an override covers it, and the operator owes a reason
    AwaitingOverrideReason {
        /// Category of the bypassed rule
        category: OverrideCategory,
        /// The blocking reason being bypassed
        bypassed: BlockReason,
    },
    /// The commit write is in flight
    Committing {
        /// Set when this commit bypasses a rule under an override
        override_used: Option<OverrideCategory>,
    },
}

/// One scan attempt that is suspended on an async step.
#[derive(Clone, Debug)]
pub struct PendingScan {
    /// The original presentation
    pub attempt: ScanAttempt,
    /// Live input or an offline-queue replay
    pub source: ScanSource,
    /// Current phase
    pub phase: ScanPhase,
    /// Verified credential token
    pub token: String,
    /// Resolved ticket, once the lookup returned
    pub ticket: Option<Ticket>,
    /// Rule evaluation, once computed
    pub evaluation: Option<Evaluation>,
}

/// Bookkeeping for one in-progress sync round.
///
/// `processed` guards against re-picking an entry that went back to pending
/// after a transient failure; each round touches each entry at most once.
#[derive(Clone, Debug, Default)]
pub struct SyncRound {
    /// Counters reported when the round finishes
    pub summary: SyncSummary,
    /// Entries this round has already attempted
    pub processed: HashSet<QueuedScanId>,
}

/// Process-wide coordinator state.
///
/// Owned by the store and mutated only inside the reducer under the store's
/// write lock, the single point of serialization for capacity and override
/// state required to keep two concurrent commits from both believing the
/// last slot was free.
#[derive(Clone, Debug)]
pub struct ScanState {
    /// Current connectivity as last reported by the signal
    pub online: bool,
    /// Venue re-entry policy
    pub reentry_mode: ReentryMode,
    /// Duplicate-scan suppression
    pub debounce: DebounceGuard,
    /// The optionally-active override session (at most one, process-wide)
    pub override_session: Option<OverrideSession>,
    /// Authoritative local capacity view, advanced inside the commit path
    pub capacity: HashMap<EventId, CapacityStatus>,
    /// Batch approval queue
    pub batch: BatchCollector,
    /// Offline scans awaiting sync
    pub queue: OfflineQueue,
    /// Scans suspended on an async step, by attempt
    pub pending: HashMap<AttemptId, PendingScan>,
    /// In-progress sync round, if any
    pub sync_round: Option<SyncRound>,
}

impl ScanState {
    /// Create the initial state.
    ///
    /// Connectivity starts online; the signal corrects it on first report.
    #[must_use]
    pub fn new(debounce_window: Duration, reentry_mode: ReentryMode) -> Self {
        Self {
            online: true,
            reentry_mode,
            debounce: DebounceGuard::new(debounce_window),
            override_session: None,
            capacity: HashMap::new(),
            batch: BatchCollector::new(),
            queue: OfflineQueue::new(),
            pending: HashMap::new(),
            sync_round: None,
        }
    }
}
