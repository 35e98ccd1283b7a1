//! The scan coordinator reducer.
//!
//! One reducer drives the whole per-credential state machine. Synchronous
//! steps (verify, debounce, offline capture, rule evaluation, capacity
//! advancement) happen in place under the store's write lock; anything that
//! touches the backend becomes an effect whose feedback event re-enters the
//! reducer.
//!
//! Capacity is advanced *before* the commit write leaves the lock: the slot
//! is reserved so two concurrent scans cannot both believe the last one was
//! free. A failed commit reverts the reservation.

use crate::error::CollaboratorError;
use crate::overrides::{OverrideEnd, OverrideLogEntry, OverrideSession};
use crate::providers::ScanLogEntry;
use crate::queue::{QueuedScan, QueuedScanId, SyncStatus, SyncSummary};
use crate::rules::{Decision, Evaluation, RuleEngine};
use crate::scan::actions::{AdmittedEntry, EntryResolution, ScanAction, ScanSource};
use crate::scan::environment::ScanEnv;
use crate::scan::types::{PendingScan, ScanPhase, ScanState, SyncRound};
use crate::types::{
    AttemptId, BatchEntry, BatchOutcome, BlockReason, OverrideCategory, OverrideLogId, ScanAttempt,
    ScanMethod, ScanOutcome, ScanResult, StaffId, Ticket,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use turnstile_core::{SmallVec, async_effect, delay, effect::Effect, reducer::Reducer, smallvec};

type Effects = SmallVec<[Effect<ScanAction>; 4]>;

/// Reducer for the scan coordinator.
#[derive(Clone, Debug, Default)]
pub struct ScanReducer;

impl ScanReducer {
    /// Creates a new `ScanReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // ========================================================================
    // Effect constructors
    // ========================================================================

    /// Feed an event back through the store so observers see it.
    fn emit(action: ScanAction) -> Effect<ScanAction> {
        async_effect! { Some(action) }
    }

    /// Terminal result event for an attempt.
    fn completed(attempt_id: AttemptId, result: ScanResult) -> Effect<ScanAction> {
        Self::emit(ScanAction::ScanCompleted { attempt_id, result })
    }

    /// Release a debounce key after the post-result cool-down, absorbing
    /// accidental camera re-triggers on the same physical card.
    fn release_after(key: String, cooldown: Duration) -> Effect<ScanAction> {
        delay! {
            duration: cooldown,
            action: ScanAction::ReleaseDebounce { key }
        }
    }

    /// Persist a freshly-captured offline scan. Journal failures degrade to
    /// memory-only with a warning; enqueue itself never fails.
    fn journal_append(env: &ScanEnv, scan: QueuedScan) -> Effect<ScanAction> {
        let journal = Arc::clone(&env.journal);
        async_effect! {
            if let Err(error) = journal.append(&scan).await {
                tracing::warn!(%error, entry = %scan.id, "journal append failed, entry held in memory only");
            }
            None
        }
    }

    /// Persist a status change for a queued scan.
    fn journal_update(env: &ScanEnv, scan: QueuedScan) -> Effect<ScanAction> {
        let journal = Arc::clone(&env.journal);
        async_effect! {
            if let Err(error) = journal.update(&scan).await {
                tracing::warn!(%error, entry = %scan.id, "journal update failed");
            }
            None
        }
    }

    /// Drop a synced entry from the journal.
    fn journal_remove(env: &ScanEnv, id: QueuedScanId) -> Effect<ScanAction> {
        let journal = Arc::clone(&env.journal);
        async_effect! {
            if let Err(error) = journal.remove(id).await {
                tracing::warn!(%error, entry = %id, "journal remove failed");
            }
            None
        }
    }

    /// Fire-and-forget audit row for non-commit outcomes (blocked scans,
    /// rejected credentials).
    fn audit_effect(env: &ScanEnv, entry: ScanLogEntry) -> Effect<ScanAction> {
        let audit = Arc::clone(&env.audit);
        async_effect! {
            if let Err(error) = audit.log_scan(entry).await {
                tracing::warn!(%error, "scan log write failed");
            }
            None
        }
    }

    /// Resolve the ticket and capacity for an attempt.
    ///
    /// The whole remote exchange is bounded by the configured timeout; an
    /// elapsed timeout is a transient failure (treated as offline), never a
    /// denial.
    fn lookup_effect(env: &ScanEnv, attempt_id: AttemptId, token: String) -> Effect<ScanAction> {
        let tickets = Arc::clone(&env.tickets);
        let capacity = Arc::clone(&env.capacity);
        let remote_timeout = env.timings.remote_timeout;
        async_effect! {
            let lookup = async move {
                let ticket = match tickets.find_by_token(&token).await {
                    Ok(ticket) => ticket,
                    Err(CollaboratorError::NotFound) => {
                        return ScanAction::LookupFailed {
                            attempt_id,
                            not_found: true,
                            detail: "no ticket for token".to_string(),
                        };
                    },
                    Err(error) => {
                        return ScanAction::LookupFailed {
                            attempt_id,
                            not_found: false,
                            detail: error.to_string(),
                        };
                    },
                };
                // Capacity cannot be trusted without the backend either; a
                // failed fetch routes the attempt to the queue, not to a denial.
                match capacity.capacity_for(ticket.event_id).await {
                    Ok(capacity) => ScanAction::LookupSucceeded {
                        attempt_id,
                        ticket,
                        capacity,
                    },
                    Err(error) => ScanAction::LookupFailed {
                        attempt_id,
                        not_found: false,
                        detail: error.to_string(),
                    },
                }
            };
            match tokio::time::timeout(remote_timeout, lookup).await {
                Ok(action) => Some(action),
                Err(_) => Some(ScanAction::LookupFailed {
                    attempt_id,
                    not_found: false,
                    detail: "remote call timed out".to_string(),
                }),
            }
        }
    }

    /// Commit a plain (no-override) admission or exit toggle.
    fn commit_effect(
        env: &ScanEnv,
        attempt_id: AttemptId,
        ticket: Ticket,
        exit_toggle: bool,
        staff_id: StaffId,
        method: ScanMethod,
        now: DateTime<Utc>,
    ) -> Effect<ScanAction> {
        let tickets = Arc::clone(&env.tickets);
        let audit = Arc::clone(&env.audit);
        let remote_timeout = env.timings.remote_timeout;
        async_effect! {
            let commit = async move {
                let write = if exit_toggle {
                    tickets.set_inside(ticket.id, !ticket.inside).await
                } else {
                    tickets.mark_scanned(ticket.id, staff_id, now).await
                };
                match write {
                    Ok(updated) => {
                        let entry = ScanLogEntry {
                            ticket_id: Some(updated.id),
                            staff_id,
                            method,
                            outcome: ScanOutcome::Valid,
                            block: None,
                            override_used: None,
                            override_reason: None,
                            scanned_at: now,
                        };
                        if let Err(error) = audit.log_scan(entry).await {
                            tracing::warn!(%error, ticket = %updated.id, "scan log write failed");
                        }
                        ScanAction::CommitSucceeded {
                            attempt_id,
                            ticket: updated,
                        }
                    },
                    Err(error) => ScanAction::CommitFailed {
                        attempt_id,
                        detail: error.to_string(),
                        audit_written: false,
                    },
                }
            };
            match tokio::time::timeout(remote_timeout, commit).await {
                Ok(action) => Some(action),
                Err(_) => Some(ScanAction::CommitFailed {
                    attempt_id,
                    detail: "remote call timed out".to_string(),
                    audit_written: false,
                }),
            }
        }
    }

    /// Commit an override-authorized admission.
    ///
    /// Audit rows go first: the scan log row, then the override log entry
    /// referencing it, then the ticket write. A remote failure after the
    /// logs must not erase the operator's authorization trail.
    #[allow(clippy::too_many_arguments)]
    fn override_commit_effect(
        env: &ScanEnv,
        attempt_id: AttemptId,
        ticket: Ticket,
        exit_toggle: bool,
        category: OverrideCategory,
        reason: String,
        notes: Option<String>,
        staff_id: StaffId,
        method: ScanMethod,
        now: DateTime<Utc>,
    ) -> Effect<ScanAction> {
        let tickets = Arc::clone(&env.tickets);
        let audit = Arc::clone(&env.audit);
        let remote_timeout = env.timings.remote_timeout;
        async_effect! {
            let commit = async move {
                let log = ScanLogEntry {
                    ticket_id: Some(ticket.id),
                    staff_id,
                    method,
                    outcome: ScanOutcome::Valid,
                    block: None,
                    override_used: Some(category),
                    override_reason: Some(reason.clone()),
                    scanned_at: now,
                };
                let scan_log_id = match audit.log_scan(log).await {
                    Ok(id) => id,
                    Err(error) => {
                        return ScanAction::CommitFailed {
                            attempt_id,
                            detail: error.to_string(),
                            audit_written: false,
                        };
                    },
                };

                let entry = OverrideLogEntry {
                    id: OverrideLogId::new(),
                    ticket_id: ticket.id,
                    staff_id,
                    category,
                    reason,
                    notes,
                    scan_log_id,
                    created_at: now,
                };
                if let Err(error) = audit.log_override(entry).await {
                    return ScanAction::CommitFailed {
                        attempt_id,
                        detail: error.to_string(),
                        audit_written: false,
                    };
                }

                let write = if exit_toggle {
                    tickets.set_inside(ticket.id, !ticket.inside).await
                } else {
                    tickets.mark_scanned(ticket.id, staff_id, now).await
                };
                match write {
                    Ok(updated) => ScanAction::CommitSucceeded {
                        attempt_id,
                        ticket: updated,
                    },
                    Err(error) => ScanAction::CommitFailed {
                        attempt_id,
                        detail: error.to_string(),
                        audit_written: true,
                    },
                }
            };
            match tokio::time::timeout(remote_timeout, commit).await {
                Ok(action) => Some(action),
                Err(_) => Some(ScanAction::CommitFailed {
                    attempt_id,
                    detail: "remote call timed out".to_string(),
                    audit_written: false,
                }),
            }
        }
    }

    /// Re-validate and commit every drained batch entry.
    fn approve_batch_effect(
        env: &ScanEnv,
        entries: Vec<BatchEntry>,
        staff_id: StaffId,
        now: DateTime<Utc>,
    ) -> Effect<ScanAction> {
        let tickets = Arc::clone(&env.tickets);
        let audit = Arc::clone(&env.audit);
        async_effect! {
            let mut outcome = BatchOutcome::default();
            let mut admitted = Vec::new();

            for entry in entries {
                // Time has passed since the entry was queued; a concurrent
                // path may have scanned or refunded the ticket meanwhile.
                let current = match tickets.find_by_id(entry.ticket_id).await {
                    Ok(ticket) => ticket,
                    Err(CollaboratorError::NotFound) => {
                        outcome
                            .errors
                            .push((entry.ticket_id, "ticket no longer exists".to_string()));
                        continue;
                    },
                    Err(error) => {
                        outcome.errors.push((entry.ticket_id, error.to_string()));
                        continue;
                    },
                };
                if current.already_used() {
                    outcome
                        .errors
                        .push((entry.ticket_id, "already scanned".to_string()));
                    continue;
                }
                if current.is_refunded() {
                    outcome
                        .errors
                        .push((entry.ticket_id, "refunded since queued".to_string()));
                    continue;
                }

                match tickets.mark_scanned(entry.ticket_id, staff_id, now).await {
                    Ok(updated) => {
                        let log = ScanLogEntry {
                            ticket_id: Some(updated.id),
                            staff_id,
                            method: ScanMethod::Manual,
                            outcome: ScanOutcome::Valid,
                            block: None,
                            override_used: None,
                            override_reason: None,
                            scanned_at: now,
                        };
                        if let Err(error) = audit.log_scan(log).await {
                            tracing::warn!(%error, ticket = %updated.id, "scan log write failed");
                        }
                        outcome.processed += 1;
                        admitted.push(AdmittedEntry {
                            ticket_id: updated.id,
                            event_id: updated.event_id,
                            tier: updated.tier,
                        });
                    },
                    Err(error) => outcome.errors.push((entry.ticket_id, error.to_string())),
                }
            }

            Some(ScanAction::BatchApproved { outcome, admitted })
        }
    }

    // ========================================================================
    // State helpers
    // ========================================================================

    /// Operator-facing message for a blocking reason.
    const fn block_message(reason: BlockReason) -> &'static str {
        match reason {
            BlockReason::Refunded => "Ticket was refunded",
            BlockReason::AlreadyUsed => "Ticket already used",
            BlockReason::Transferred => "Ticket was transferred, verify holder identity",
            BlockReason::AtCapacity => "Event is at capacity",
            BlockReason::CredentialInvalid => "Credential could not be verified",
            BlockReason::NotFound => "No ticket matches this credential",
            BlockReason::DuplicateInQueue => "Ticket is already in the batch queue",
        }
    }

    /// Whether this commit consumes an admission (vs. records an exit).
    const fn is_entering(ticket: &Ticket, evaluation: &Evaluation) -> bool {
        !evaluation.exit_toggle || !ticket.inside
    }

    /// Reserve (or release) the capacity slot for a commit, inside the lock.
    fn advance_capacity(state: &mut ScanState, ticket: &Ticket, evaluation: &Evaluation) {
        if let Some(capacity) = state.capacity.get_mut(&ticket.event_id) {
            if Self::is_entering(ticket, evaluation) {
                capacity.record_admission(&ticket.tier);
            } else {
                capacity.record_exit(&ticket.tier);
            }
        }
    }

    /// Undo a reserved capacity slot after a failed commit.
    fn revert_capacity(state: &mut ScanState, ticket: &Ticket, evaluation: &Evaluation) {
        if let Some(capacity) = state.capacity.get_mut(&ticket.event_id) {
            if Self::is_entering(ticket, evaluation) {
                capacity.record_exit(&ticket.tier);
            } else {
                capacity.record_admission(&ticket.tier);
            }
        }
    }

    /// Drop an expired override session, notifying observers.
    ///
    /// Expiry is wall-clock based and enforced here, at point of use on
    /// every action; there is no background timer.
    fn expire_override(state: &mut ScanState, now: DateTime<Utc>) -> Option<Effect<ScanAction>> {
        if state
            .override_session
            .as_ref()
            .is_some_and(|s| !s.is_active(now))
        {
            state.override_session = None;
            tracing::info!("override session expired");
            return Some(Self::emit(ScanAction::OverrideDeactivated {
                end: OverrideEnd::Expired,
            }));
        }
        None
    }

    /// Kick off the next queued entry of the current sync round, if any.
    ///
    /// Entries replay through the same `ProcessScan` path as live scans so
    /// refund/duplicate/capacity are evaluated against *current* state.
    fn start_next_sync_entry(state: &mut ScanState, env: &ScanEnv) -> Option<Effects> {
        let next = {
            let round = state.sync_round.as_mut()?;
            let next = state
                .queue
                .iter()
                .find(|e| e.status == SyncStatus::Pending && !round.processed.contains(&e.id))?
                .id;
            round.processed.insert(next);
            next
        };

        let entry = state.queue.get_mut(next)?;
        entry.status = SyncStatus::Syncing;
        entry.attempts += 1;
        let entry = entry.clone();

        tracing::debug!(entry = %entry.id, attempt = entry.attempts, "replaying queued scan");

        Some(smallvec![
            Self::journal_update(env, entry.clone()),
            Self::emit(ScanAction::ProcessScan {
                attempt_id: AttemptId::new(),
                raw_payload: entry.raw_payload,
                method: entry.method,
                staff_id: entry.staff_id,
                source: ScanSource::Queue(next),
            }),
        ])
    }

    /// Record how a queued entry resolved and continue (or finish) the round.
    fn finish_queue_entry(
        state: &mut ScanState,
        env: &ScanEnv,
        id: QueuedScanId,
        resolution: EntryResolution,
    ) -> Effects {
        let mut effects: Effects = SmallVec::new();

        let resolution = match resolution {
            EntryResolution::Synced | EntryResolution::Blocked(_) => {
                if state.queue.remove(id).is_some() {
                    effects.push(Self::journal_remove(env, id));
                }
                resolution
            },
            EntryResolution::Retrying | EntryResolution::Failed => {
                let max_attempts = env.timings.max_sync_attempts;
                let mut resolved = EntryResolution::Retrying;
                if let Some(entry) = state.queue.get_mut(id) {
                    if entry.attempts >= max_attempts {
                        entry.status = SyncStatus::Failed;
                        resolved = EntryResolution::Failed;
                        tracing::warn!(
                            entry = %id,
                            attempts = entry.attempts,
                            "queued scan exhausted retries, retained for export"
                        );
                    } else {
                        entry.status = SyncStatus::Pending;
                    }
                    effects.push(Self::journal_update(env, entry.clone()));
                }
                resolved
            },
        };

        if let Some(round) = state.sync_round.as_mut() {
            round.summary.total += 1;
            match resolution {
                EntryResolution::Synced => round.summary.synced += 1,
                EntryResolution::Blocked(_) => round.summary.blocked += 1,
                EntryResolution::Retrying | EntryResolution::Failed => round.summary.failed += 1,
            }
        }

        effects.push(Self::emit(ScanAction::QueueEntryResolved { id, resolution }));

        if let Some(mut next) = Self::start_next_sync_entry(state, env) {
            effects.append(&mut next);
        } else {
            let summary = state
                .sync_round
                .take()
                .map(|r| r.summary)
                .unwrap_or_default();
            tracing::info!(
                total = summary.total,
                synced = summary.synced,
                blocked = summary.blocked,
                failed = summary.failed,
                "sync round finished"
            );
            effects.push(Self::emit(ScanAction::SyncCompleted { summary }));
        }

        effects
    }

    /// Capture a live attempt into the offline queue.
    fn enqueue_offline(
        state: &mut ScanState,
        env: &ScanEnv,
        attempt: &ScanAttempt,
        now: DateTime<Utc>,
    ) -> Effects {
        let scan = QueuedScan::new(
            attempt.raw_payload.clone(),
            attempt.method,
            attempt.staff_id,
            now,
        );
        tracing::info!(entry = %scan.id, "offline, scan captured for later sync");
        state.queue.push(scan.clone());

        let result = ScanResult::queued("Offline: scan captured and will sync automatically");
        smallvec![
            Self::journal_append(env, scan),
            Self::completed(attempt.attempt_id, result),
            Self::release_after(attempt.raw_payload.clone(), env.timings.result_cooldown),
        ]
    }

    // ========================================================================
    // Action handlers
    // ========================================================================

    fn handle_process_scan(
        state: &mut ScanState,
        env: &ScanEnv,
        attempt_id: AttemptId,
        raw_payload: String,
        method: ScanMethod,
        staff_id: StaffId,
        source: ScanSource,
    ) -> Effects {
        let now = env.clock.now();

        // Verify first: an unverifiable credential is never queued and never
        // holds a debounce key.
        let credential = match env.verifier.verify(&raw_payload) {
            Ok(credential) => credential,
            Err(error) => {
                tracing::warn!(%attempt_id, %error, "credential rejected");
                let result = ScanResult::blocked(
                    None,
                    BlockReason::CredentialInvalid,
                    Self::block_message(BlockReason::CredentialInvalid),
                );
                let mut effects: Effects = smallvec![Self::audit_effect(
                    env,
                    ScanLogEntry {
                        ticket_id: None,
                        staff_id,
                        method,
                        outcome: result.outcome,
                        block: result.block,
                        override_used: None,
                        override_reason: None,
                        scanned_at: now,
                    },
                )];
                match source {
                    ScanSource::Live => effects.push(Self::completed(attempt_id, result)),
                    ScanSource::Queue(id) => effects.append(&mut Self::finish_queue_entry(
                        state,
                        env,
                        id,
                        EntryResolution::Blocked(BlockReason::CredentialInvalid),
                    )),
                }
                return effects;
            },
        };

        // Debounce live inputs. Rejection is a silent no-op: no error, no
        // second notification, the key's owner is still mid-flight.
        if source.is_live() && !state.debounce.admit(&raw_payload, now) {
            tracing::debug!(%attempt_id, "duplicate scan suppressed");
            return smallvec![Self::emit(ScanAction::ScanIgnored { attempt_id })];
        }

        let attempt = ScanAttempt {
            attempt_id,
            raw_payload: raw_payload.clone(),
            method,
            presented_at: now,
            staff_id,
        };

        // No rule evaluation offline: refund/transfer/capacity state cannot
        // be trusted without the backend.
        if source.is_live() && !state.online {
            return Self::enqueue_offline(state, env, &attempt, now);
        }

        state.pending.insert(
            attempt_id,
            PendingScan {
                attempt,
                source,
                phase: ScanPhase::Checking,
                token: credential.token.clone(),
                ticket: None,
                evaluation: None,
            },
        );

        smallvec![Self::lookup_effect(env, attempt_id, credential.token)]
    }

    #[allow(clippy::too_many_lines)] // One arm per decision branch
    fn handle_lookup_succeeded(
        state: &mut ScanState,
        env: &ScanEnv,
        attempt_id: AttemptId,
        ticket: Ticket,
        capacity: crate::types::CapacityStatus,
    ) -> Effects {
        let Some(pending) = state.pending.get(&attempt_id).cloned() else {
            return SmallVec::new();
        };
        let now = env.clock.now();

        // Seed the capacity cache from the backend; once present, the local
        // copy is authoritative because commits advance it under the lock.
        state.capacity.entry(ticket.event_id).or_insert(capacity);
        let capacity_view = state.capacity.get(&ticket.event_id).cloned();

        // Overrides are an operator workflow; automated queue replays never
        // consult the session.
        let session: Option<OverrideSession> = if pending.source.is_live() {
            state.override_session.clone()
        } else {
            None
        };

        let evaluation = RuleEngine::evaluate(
            &ticket,
            capacity_view.as_ref(),
            state.reentry_mode,
            session.as_ref(),
            now,
        );
        tracing::debug!(%attempt_id, ticket = %ticket.id, decision = ?evaluation.decision, "rules evaluated");

        match evaluation.decision.clone() {
            Decision::Blocked(reason) => {
                state.pending.remove(&attempt_id);
                let result =
                    ScanResult::blocked(Some(ticket.clone()), reason, Self::block_message(reason));
                let mut effects: Effects = smallvec![Self::audit_effect(
                    env,
                    ScanLogEntry {
                        ticket_id: Some(ticket.id),
                        staff_id: pending.attempt.staff_id,
                        method: pending.attempt.method,
                        outcome: result.outcome,
                        block: result.block,
                        override_used: None,
                        override_reason: None,
                        scanned_at: now,
                    },
                )];
                match pending.source {
                    ScanSource::Live => {
                        effects.push(Self::completed(attempt_id, result));
                        effects.push(Self::release_after(
                            pending.attempt.raw_payload.clone(),
                            env.timings.result_cooldown,
                        ));
                    },
                    ScanSource::Queue(id) => effects.append(&mut Self::finish_queue_entry(
                        state,
                        env,
                        id,
                        EntryResolution::Blocked(reason),
                    )),
                }
                effects
            },

            Decision::AllowedWithOverride { category, bypassed } => {
                // Suspend: the commit needs an operator-supplied reason, and
                // a half-completed override must never commit.
                if let Some(p) = state.pending.get_mut(&attempt_id) {
                    p.phase = ScanPhase::AwaitingOverrideReason { category, bypassed };
                    p.ticket = Some(ticket.clone());
                    p.evaluation = Some(evaluation);
                }
                tracing::info!(%attempt_id, %category, "block is override-eligible, awaiting reason");
                smallvec![
                    Self::emit(ScanAction::OverrideReasonRequired {
                        attempt_id,
                        category,
                        ticket,
                    }),
                    delay! {
                        duration: env.timings.override_reason_timeout,
                        action: ScanAction::OverrideReasonTimeout { attempt_id }
                    },
                ]
            },

            Decision::Allowed => {
                if state.batch.enabled() && pending.source.is_live() {
                    state.pending.remove(&attempt_id);
                    let result =
                        ScanResult::valid(ticket.clone(), "Validated, queued for batch approval");
                    let entry = BatchEntry {
                        ticket_id: ticket.id,
                        holder_name: ticket.holder_name.clone(),
                        tier: ticket.tier.clone(),
                        result: result.clone(),
                        added_at: now,
                    };
                    let result = match state.batch.add(entry) {
                        Ok(()) => result,
                        Err(rejection) => {
                            tracing::debug!(%attempt_id, reason = rejection.as_str(), "batch add rejected");
                            ScanResult::blocked(
                                Some(ticket),
                                BlockReason::DuplicateInQueue,
                                Self::block_message(BlockReason::DuplicateInQueue),
                            )
                        },
                    };
                    smallvec![
                        Self::completed(attempt_id, result),
                        Self::release_after(
                            pending.attempt.raw_payload.clone(),
                            env.timings.result_cooldown
                        ),
                    ]
                } else {
                    if let Some(p) = state.pending.get_mut(&attempt_id) {
                        p.phase = ScanPhase::Committing {
                            override_used: None,
                        };
                        p.ticket = Some(ticket.clone());
                        p.evaluation = Some(evaluation.clone());
                    }
                    Self::advance_capacity(state, &ticket, &evaluation);
                    smallvec![Self::commit_effect(
                        env,
                        attempt_id,
                        ticket,
                        evaluation.exit_toggle,
                        pending.attempt.staff_id,
                        pending.attempt.method,
                        now,
                    )]
                }
            },
        }
    }

    fn handle_lookup_failed(
        state: &mut ScanState,
        env: &ScanEnv,
        attempt_id: AttemptId,
        not_found: bool,
        detail: &str,
    ) -> Effects {
        let Some(pending) = state.pending.remove(&attempt_id) else {
            return SmallVec::new();
        };
        let now = env.clock.now();
        let mut effects: Effects = SmallVec::new();

        if not_found {
            tracing::warn!(%attempt_id, "credential resolved to no ticket");
            let result = ScanResult::blocked(
                None,
                BlockReason::NotFound,
                Self::block_message(BlockReason::NotFound),
            );
            effects.push(Self::audit_effect(
                env,
                ScanLogEntry {
                    ticket_id: None,
                    staff_id: pending.attempt.staff_id,
                    method: pending.attempt.method,
                    outcome: result.outcome,
                    block: result.block,
                    override_used: None,
                    override_reason: None,
                    scanned_at: now,
                },
            ));
            match pending.source {
                ScanSource::Live => {
                    effects.push(Self::completed(attempt_id, result));
                    effects.push(Self::release_after(
                        pending.attempt.raw_payload.clone(),
                        env.timings.result_cooldown,
                    ));
                },
                ScanSource::Queue(id) => effects.append(&mut Self::finish_queue_entry(
                    state,
                    env,
                    id,
                    EntryResolution::Blocked(BlockReason::NotFound),
                )),
            }
        } else {
            // Transient failure is never a denial: route to the queue.
            tracing::warn!(%attempt_id, detail, "backend unreachable, treating as offline");
            match pending.source {
                ScanSource::Live => {
                    effects.append(&mut Self::enqueue_offline(state, env, &pending.attempt, now));
                },
                ScanSource::Queue(id) => effects.append(&mut Self::finish_queue_entry(
                    state,
                    env,
                    id,
                    EntryResolution::Retrying,
                )),
            }
        }

        effects
    }

    fn handle_commit_succeeded(
        state: &mut ScanState,
        env: &ScanEnv,
        attempt_id: AttemptId,
        ticket: Ticket,
    ) -> Effects {
        let Some(pending) = state.pending.remove(&attempt_id) else {
            return SmallVec::new();
        };

        let override_used = match pending.phase {
            ScanPhase::Committing { override_used } => override_used,
            _ => None,
        };
        let exit_toggle = pending.evaluation.as_ref().is_some_and(|e| e.exit_toggle);
        let was_inside = pending.ticket.as_ref().is_some_and(|t| t.inside);

        let message = if exit_toggle && was_inside {
            "Exit recorded"
        } else if exit_toggle {
            "Re-entry approved"
        } else {
            "Entry approved"
        };
        let mut result = ScanResult::valid(ticket.clone(), message);
        if let Some(category) = override_used {
            result = result.with_override(category);
        }
        tracing::info!(
            %attempt_id,
            ticket = %ticket.id,
            override_used = override_used.map(|c| c.as_str()).unwrap_or("none"),
            "scan committed"
        );

        let mut effects: Effects = SmallVec::new();
        match pending.source {
            ScanSource::Live => {
                effects.push(Self::completed(attempt_id, result));
                effects.push(Self::release_after(
                    pending.attempt.raw_payload.clone(),
                    env.timings.result_cooldown,
                ));
            },
            ScanSource::Queue(id) => effects.append(&mut Self::finish_queue_entry(
                state,
                env,
                id,
                EntryResolution::Synced,
            )),
        }
        effects
    }

    fn handle_commit_failed(
        state: &mut ScanState,
        env: &ScanEnv,
        attempt_id: AttemptId,
        detail: &str,
        audit_written: bool,
    ) -> Effects {
        let Some(pending) = state.pending.remove(&attempt_id) else {
            return SmallVec::new();
        };
        let now = env.clock.now();

        // The slot reserved before the write is no longer consumed.
        if let (Some(ticket), Some(evaluation)) = (&pending.ticket, &pending.evaluation) {
            Self::revert_capacity(state, ticket, evaluation);
        }

        let was_override_commit = matches!(
            pending.phase,
            ScanPhase::Committing {
                override_used: Some(_)
            }
        );

        match pending.source {
            ScanSource::Live if was_override_commit => {
                // Do not queue: the operator is present and the audit rows
                // (when written) already record the authorization.
                tracing::error!(%attempt_id, detail, audit_written, "override commit failed");
                let message = if audit_written {
                    "Override recorded but the ticket update failed, rescan required"
                } else {
                    "Override could not be recorded, try again"
                };
                let result = ScanResult {
                    outcome: ScanOutcome::Invalid,
                    ticket: pending.ticket.clone(),
                    message: message.to_string(),
                    block: None,
                    transfer: None,
                    refund: None,
                    override_used: None,
                    requires_id_check: false,
                };
                smallvec![
                    Self::completed(attempt_id, result),
                    Self::release_after(
                        pending.attempt.raw_payload.clone(),
                        env.timings.result_cooldown
                    ),
                ]
            },
            ScanSource::Live => {
                tracing::warn!(%attempt_id, detail, "commit failed, capturing offline");
                Self::enqueue_offline(state, env, &pending.attempt, now)
            },
            ScanSource::Queue(id) => {
                Self::finish_queue_entry(state, env, id, EntryResolution::Retrying)
            },
        }
    }

    fn handle_sync_queue(state: &mut ScanState, env: &ScanEnv) -> Effects {
        if state.sync_round.is_some() {
            // A round is already draining; its SyncCompleted will arrive.
            return SmallVec::new();
        }
        if !state.online || state.queue.pending_len() == 0 {
            return smallvec![Self::emit(ScanAction::SyncCompleted {
                summary: SyncSummary::default(),
            })];
        }

        tracing::info!(pending = state.queue.pending_len(), "sync round started");
        state.sync_round = Some(SyncRound::default());
        Self::start_next_sync_entry(state, env).unwrap_or_default()
    }
}

impl Reducer for ScanReducer {
    type State = ScanState;
    type Action = ScanAction;
    type Environment = ScanEnv;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        let mut effects: Effects = SmallVec::new();

        // Point-of-use expiry for the override session, on every action.
        if let Some(effect) = Self::expire_override(state, env.clock.now()) {
            effects.push(effect);
        }

        let mut action_effects = match action {
            // ========== Commands ==========
            ScanAction::ProcessScan {
                attempt_id,
                raw_payload,
                method,
                staff_id,
                source,
            } => Self::handle_process_scan(
                state,
                env,
                attempt_id,
                raw_payload,
                method,
                staff_id,
                source,
            ),

            ScanAction::SupplyOverrideReason {
                attempt_id,
                reason,
                notes,
            } => {
                let Some(pending) = state.pending.get(&attempt_id).cloned() else {
                    return effects;
                };
                let ScanPhase::AwaitingOverrideReason { category, .. } = pending.phase else {
                    return effects;
                };
                let reason = reason.trim().to_string();
                if reason.is_empty() {
                    // A half-completed override must not commit; the scan
                    // stays suspended until a reason arrives or it is
                    // cancelled.
                    tracing::warn!(%attempt_id, "empty override reason, commit withheld");
                    return effects;
                }
                let (Some(ticket), Some(evaluation)) =
                    (pending.ticket.clone(), pending.evaluation.clone())
                else {
                    return effects;
                };

                if let Some(p) = state.pending.get_mut(&attempt_id) {
                    p.phase = ScanPhase::Committing {
                        override_used: Some(category),
                    };
                }
                Self::advance_capacity(state, &ticket, &evaluation);
                tracing::info!(%attempt_id, %category, "override reason supplied, committing");

                smallvec![Self::override_commit_effect(
                    env,
                    attempt_id,
                    ticket,
                    evaluation.exit_toggle,
                    category,
                    reason,
                    notes,
                    pending.attempt.staff_id,
                    pending.attempt.method,
                    env.clock.now(),
                )]
            },

            ScanAction::CancelOverrideReason { attempt_id }
            | ScanAction::OverrideReasonTimeout { attempt_id } => {
                let waiting = state.pending.get(&attempt_id).is_some_and(|p| {
                    matches!(p.phase, ScanPhase::AwaitingOverrideReason { .. })
                });
                if !waiting {
                    return effects;
                }
                // Abandon fully: ticket state untouched, key released now,
                // as if the scan never happened.
                if let Some(pending) = state.pending.remove(&attempt_id) {
                    state.debounce.release(&pending.attempt.raw_payload);
                }
                tracing::info!(%attempt_id, "override prompt abandoned");
                smallvec![Self::emit(ScanAction::ScanAbandoned { attempt_id })]
            },

            ScanAction::ActivateOverride { staff_id } => {
                let session = OverrideSession::activate(
                    staff_id,
                    env.clock.now(),
                    env.timings.override_duration,
                );
                let expires_at = session.expires_at;
                let replaced = state.override_session.replace(session).is_some();
                tracing::info!(%staff_id, replaced, "override session activated");
                smallvec![Self::emit(ScanAction::OverrideActivated {
                    staff_id,
                    expires_at,
                })]
            },

            ScanAction::DeactivateOverride => {
                if state.override_session.take().is_some() {
                    tracing::info!("override session deactivated");
                    smallvec![Self::emit(ScanAction::OverrideDeactivated {
                        end: OverrideEnd::Manual,
                    })]
                } else {
                    SmallVec::new()
                }
            },

            ScanAction::SetReentryMode { mode } => {
                tracing::info!(?mode, "re-entry mode changed");
                state.reentry_mode = mode;
                SmallVec::new()
            },

            ScanAction::SetBatchMode { enabled } => {
                tracing::info!(enabled, "batch mode toggled");
                state.batch.set_enabled(enabled);
                SmallVec::new()
            },

            ScanAction::RemoveBatchEntry { ticket_id } => {
                state.batch.remove(ticket_id);
                SmallVec::new()
            },

            ScanAction::ClearBatch => {
                state.batch.clear();
                SmallVec::new()
            },

            ScanAction::ApproveBatch { staff_id } => {
                let entries = state.batch.drain();
                if entries.is_empty() {
                    smallvec![Self::emit(ScanAction::BatchApproved {
                        outcome: BatchOutcome::default(),
                        admitted: Vec::new(),
                    })]
                } else {
                    tracing::info!(count = entries.len(), "batch approval started");
                    smallvec![Self::approve_batch_effect(
                        env,
                        entries,
                        staff_id,
                        env.clock.now()
                    )]
                }
            },

            ScanAction::SyncQueue => Self::handle_sync_queue(state, env),

            ScanAction::SetConnectivity { online } => {
                let was_online = state.online;
                state.online = online;
                if was_online != online {
                    tracing::info!(online, "connectivity changed");
                }
                if !was_online && online && state.queue.pending_len() > 0 {
                    // Drain immediately on the offline→online edge.
                    smallvec![Self::emit(ScanAction::SyncQueue)]
                } else {
                    SmallVec::new()
                }
            },

            ScanAction::RestoreQueue { entries } => {
                tracing::info!(count = entries.len(), "restoring journal into queue");
                state.queue.restore(entries);
                SmallVec::new()
            },

            ScanAction::ReleaseDebounce { key } => {
                state.debounce.release(&key);
                SmallVec::new()
            },

            // ========== Events ==========
            ScanAction::LookupSucceeded {
                attempt_id,
                ticket,
                capacity,
            } => Self::handle_lookup_succeeded(state, env, attempt_id, ticket, capacity),

            ScanAction::LookupFailed {
                attempt_id,
                not_found,
                detail,
            } => Self::handle_lookup_failed(state, env, attempt_id, not_found, &detail),

            ScanAction::CommitSucceeded { attempt_id, ticket } => {
                Self::handle_commit_succeeded(state, env, attempt_id, ticket)
            },

            ScanAction::CommitFailed {
                attempt_id,
                detail,
                audit_written,
            } => Self::handle_commit_failed(state, env, attempt_id, &detail, audit_written),

            ScanAction::BatchApproved { ref admitted, .. } => {
                for entry in admitted {
                    if let Some(capacity) = state.capacity.get_mut(&entry.event_id) {
                        capacity.record_admission(&entry.tier);
                    }
                }
                SmallVec::new()
            },

            // Terminal and notification events carry no state changes; they
            // exist for the broadcast observers.
            ScanAction::ScanCompleted { .. }
            | ScanAction::ScanIgnored { .. }
            | ScanAction::ScanAbandoned { .. }
            | ScanAction::OverrideReasonRequired { .. }
            | ScanAction::OverrideActivated { .. }
            | ScanAction::OverrideDeactivated { .. }
            | ScanAction::QueueEntryResolved { .. }
            | ScanAction::SyncCompleted { .. } => SmallVec::new(),
        };

        effects.append(&mut action_effects);
        effects
    }
}
