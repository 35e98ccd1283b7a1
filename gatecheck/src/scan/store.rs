//! The gate facade.
//!
//! [`Gate`] wraps the store and exposes the engine's public surface:
//! `process_scan` and the override/batch/sync/capacity operations. Calls are
//! synchronous from the caller's point of view; internally they send an
//! action and wait on the store broadcast for the attempt's terminal event.

use crate::config::{Config, Timings};
use crate::credential::CredentialVerifier;
use crate::error::ScanError;
use crate::journal::ScanJournal;
use crate::overrides::OverrideSession;
use crate::providers::{AuditSink, CapacityProvider, TicketStore};
use crate::queue::{QueuedScan, SyncSummary};
use crate::scan::actions::{ScanAction, ScanSource};
use crate::scan::environment::ScanEnv;
use crate::scan::reducer::ScanReducer;
use crate::scan::types::ScanState;
use crate::types::{
    AttemptId, BatchEntry, BatchOutcome, CapacityStatus, EventId, OverrideCategory, ReentryMode,
    ScanMethod, ScanResult, StaffId, Ticket, TicketId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use turnstile_core::environment::Clock;
use turnstile_runtime::{Store, StoreError};

/// How long facade calls wait for their terminal event before giving up.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a `process_scan` call came back with.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanResponse {
    /// The attempt finished with a result
    Completed(ScanResult),
    /// A rule blocked, an active override covers it, and the engine is
    /// waiting for the operator's reason before committing
    AwaitingOverrideReason {
        /// Handle for `supply_override_reason` / `cancel_override_reason`
        attempt_id: AttemptId,
        /// Category that would be bypassed
        category: OverrideCategory,
        /// The ticket in question, for the operator prompt
        ticket: Ticket,
    },
    /// Duplicate rapid scan, silently dropped (show nothing)
    Ignored,
}

/// Snapshot of the offline queue for operator UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueStatus {
    /// Entries waiting to sync
    pub pending: usize,
    /// Entries retained after exhausting retries
    pub failed: usize,
    /// Whether a sync round is currently draining
    pub syncing: bool,
    /// Connectivity as last reported
    pub online: bool,
}

/// The scan validation engine's public entry point.
pub struct Gate {
    store: Store<ScanState, ScanAction, ScanEnv, ScanReducer>,
    journal: Arc<dyn ScanJournal>,
    capacity: Arc<dyn CapacityProvider>,
}

impl Gate {
    /// Build a gate from configuration and backend collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] when the signing secret is
    /// missing or the crypto primitive is unavailable; the engine refuses
    /// to start rather than accept unsigned credentials.
    pub fn new(
        config: &Config,
        clock: Arc<dyn Clock>,
        tickets: Arc<dyn TicketStore>,
        capacity: Arc<dyn CapacityProvider>,
        audit: Arc<dyn AuditSink>,
        journal: Arc<dyn ScanJournal>,
    ) -> Result<Self, ScanError> {
        let verifier = Arc::new(CredentialVerifier::new(&config.signing_secret)?);
        let state = ScanState::new(config.debounce_window(), config.reentry_mode);
        let env = ScanEnv::new(
            clock,
            verifier,
            tickets,
            Arc::clone(&capacity),
            audit,
            Arc::clone(&journal),
            Timings::from(config),
        );

        Ok(Self {
            store: Store::new(state, ScanReducer::new(), env),
            journal,
            capacity,
        })
    }

    /// Load journal contents into the queue (call once at startup).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Journal`] when the journal cannot be read.
    pub async fn restore_from_journal(&self) -> Result<usize, ScanError> {
        let entries: Vec<QueuedScan> = self
            .journal
            .load()
            .await
            .map_err(|e| ScanError::Journal(e.to_string()))?;
        let count = entries.len();
        if count > 0 {
            self.send(ScanAction::RestoreQueue { entries }).await?;
        }
        Ok(count)
    }

    /// Process one presented credential.
    ///
    /// Synchronous from the caller's point of view: resolves once the
    /// attempt reaches a terminal state or suspends waiting for an override
    /// reason.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] when the engine shut down or the
    /// response timed out.
    pub async fn process_scan(
        &self,
        raw_payload: impl Into<String>,
        method: ScanMethod,
        staff_id: StaffId,
    ) -> Result<ScanResponse, ScanError> {
        let attempt_id = AttemptId::new();
        let action = ScanAction::ProcessScan {
            attempt_id,
            raw_payload: raw_payload.into(),
            method,
            staff_id,
            source: ScanSource::Live,
        };

        let terminal = self
            .store
            .send_and_wait_for(
                action,
                move |a| match a {
                    ScanAction::ScanCompleted { attempt_id: id, .. }
                    | ScanAction::ScanIgnored { attempt_id: id }
                    | ScanAction::OverrideReasonRequired { attempt_id: id, .. } => *id == attempt_id,
                    _ => false,
                },
                RESPONSE_TIMEOUT,
            )
            .await
            .map_err(Self::engine_error)?;

        Ok(match terminal {
            ScanAction::ScanCompleted { result, .. } => ScanResponse::Completed(result),
            ScanAction::OverrideReasonRequired {
                attempt_id,
                category,
                ticket,
            } => ScanResponse::AwaitingOverrideReason {
                attempt_id,
                category,
                ticket,
            },
            _ => ScanResponse::Ignored,
        })
    }

    /// Supply the mandatory reason for a suspended override commit.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] for an empty reason, an unknown
    /// attempt, or a response timeout.
    pub async fn supply_override_reason(
        &self,
        attempt_id: AttemptId,
        reason: impl Into<String>,
        notes: Option<String>,
    ) -> Result<ScanResult, ScanError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ScanError::Engine(
                "override reason must not be empty".to_string(),
            ));
        }

        let terminal = self
            .store
            .send_and_wait_for(
                ScanAction::SupplyOverrideReason {
                    attempt_id,
                    reason,
                    notes,
                },
                move |a| {
                    matches!(a, ScanAction::ScanCompleted { attempt_id: id, .. } if *id == attempt_id)
                },
                RESPONSE_TIMEOUT,
            )
            .await
            .map_err(Self::engine_error)?;

        match terminal {
            ScanAction::ScanCompleted { result, .. } => Ok(result),
            _ => Err(ScanError::Engine("unexpected terminal action".to_string())),
        }
    }

    /// Cancel a suspended override commit, abandoning the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown or timeout.
    pub async fn cancel_override_reason(&self, attempt_id: AttemptId) -> Result<(), ScanError> {
        self.store
            .send_and_wait_for(
                ScanAction::CancelOverrideReason { attempt_id },
                move |a| {
                    matches!(a, ScanAction::ScanAbandoned { attempt_id: id } if *id == attempt_id)
                },
                RESPONSE_TIMEOUT,
            )
            .await
            .map_err(Self::engine_error)?;
        Ok(())
    }

    /// Activate (or replace) the override session; returns its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown or timeout.
    pub async fn activate_override(&self, staff_id: StaffId) -> Result<DateTime<Utc>, ScanError> {
        let terminal = self
            .store
            .send_and_wait_for(
                ScanAction::ActivateOverride { staff_id },
                |a| matches!(a, ScanAction::OverrideActivated { .. }),
                RESPONSE_TIMEOUT,
            )
            .await
            .map_err(Self::engine_error)?;

        match terminal {
            ScanAction::OverrideActivated { expires_at, .. } => Ok(expires_at),
            _ => Err(ScanError::Engine("unexpected terminal action".to_string())),
        }
    }

    /// Deactivate the override session (no-op when none is active).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn deactivate_override(&self) -> Result<(), ScanError> {
        self.send(ScanAction::DeactivateOverride).await
    }

    /// The active override session, if any.
    pub async fn override_session(&self) -> Option<OverrideSession> {
        self.store.state(|s| s.override_session.clone()).await
    }

    /// Change the venue re-entry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn set_reentry_mode(&self, mode: ReentryMode) -> Result<(), ScanError> {
        self.send(ScanAction::SetReentryMode { mode }).await
    }

    /// Toggle batch mode (disabling discards pending entries).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn set_batch_mode(&self, enabled: bool) -> Result<(), ScanError> {
        self.send(ScanAction::SetBatchMode { enabled }).await
    }

    /// Remove one entry from the batch queue.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn remove_batch_entry(&self, ticket_id: TicketId) -> Result<(), ScanError> {
        self.send(ScanAction::RemoveBatchEntry { ticket_id }).await
    }

    /// Discard all batch queue entries.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn clear_batch(&self) -> Result<(), ScanError> {
        self.send(ScanAction::ClearBatch).await
    }

    /// Entries currently waiting for batch approval.
    pub async fn batch_entries(&self) -> Vec<BatchEntry> {
        self.store.state(|s| s.batch.entries().to_vec()).await
    }

    /// Re-validate and commit everything in the batch queue.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown or timeout.
    pub async fn approve_batch(&self, staff_id: StaffId) -> Result<BatchOutcome, ScanError> {
        let terminal = self
            .store
            .send_and_wait_for(
                ScanAction::ApproveBatch { staff_id },
                |a| matches!(a, ScanAction::BatchApproved { .. }),
                RESPONSE_TIMEOUT,
            )
            .await
            .map_err(Self::engine_error)?;

        match terminal {
            ScanAction::BatchApproved { outcome, .. } => Ok(outcome),
            _ => Err(ScanError::Engine("unexpected terminal action".to_string())),
        }
    }

    /// Run a sync round now and wait for its summary.
    ///
    /// If a round is already draining, this resolves with that round's
    /// summary. Offline (or with nothing queued) it resolves immediately
    /// with zeros.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown or timeout.
    pub async fn sync_now(&self) -> Result<SyncSummary, ScanError> {
        let terminal = self
            .store
            .send_and_wait_for(
                ScanAction::SyncQueue,
                |a| matches!(a, ScanAction::SyncCompleted { .. }),
                RESPONSE_TIMEOUT,
            )
            .await
            .map_err(Self::engine_error)?;

        match terminal {
            ScanAction::SyncCompleted { summary } => Ok(summary),
            _ => Err(ScanError::Engine("unexpected terminal action".to_string())),
        }
    }

    /// Fire-and-forget sync request (used by the background worker).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn request_sync(&self) -> Result<(), ScanError> {
        self.send(ScanAction::SyncQueue).await
    }

    /// Report connectivity; the offline→online edge triggers a sync.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] on shutdown.
    pub async fn set_connectivity(&self, online: bool) -> Result<(), ScanError> {
        self.send(ScanAction::SetConnectivity { online }).await
    }

    /// Offline queue snapshot for operator UI.
    pub async fn sync_status(&self) -> QueueStatus {
        self.store
            .state(|s| QueueStatus {
                pending: s.queue.pending_len(),
                failed: s.queue.failed_len(),
                syncing: s.sync_round.is_some(),
                online: s.online,
            })
            .await
    }

    /// Entries retained after exhausting sync retries, for export.
    pub async fn failed_queue_entries(&self) -> Vec<QueuedScan> {
        self.store
            .state(|s| s.queue.failed().cloned().collect())
            .await
    }

    /// The engine's capacity view for an event.
    ///
    /// Serves the authoritative local cache (advanced on every commit) when
    /// present, and falls back to the provider for events this gate has not
    /// scanned yet.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::TicketNotFound`] when the provider knows no such
    /// event, or [`ScanError::TransientNetwork`] when it cannot be reached.
    pub async fn capacity_status(&self, event_id: EventId) -> Result<CapacityStatus, ScanError> {
        if let Some(cached) = self.store.state(|s| s.capacity.get(&event_id).cloned()).await {
            return Ok(cached);
        }
        Ok(self.capacity.capacity_for(event_id).await?)
    }

    /// Subscribe to all engine events (results, override notifications,
    /// sync progress) for operator UI streaming.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanAction> {
        self.store.subscribe_actions()
    }

    /// Gracefully shut the engine down.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Engine`] when effects were still running at the
    /// timeout.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ScanError> {
        self.store
            .shutdown(timeout)
            .await
            .map_err(Self::engine_error)
    }

    async fn send(&self, action: ScanAction) -> Result<(), ScanError> {
        self.store
            .send(action)
            .await
            .map(drop)
            .map_err(Self::engine_error)
    }

    fn engine_error(error: StoreError) -> ScanError {
        ScanError::Engine(error.to_string())
    }
}
