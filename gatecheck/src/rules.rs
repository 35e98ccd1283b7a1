//! Layered entry rules.
//!
//! The rule engine is a pure function over snapshots: ticket, capacity,
//! venue re-entry policy, and the optionally-active override session. Rules
//! run in fixed order and the first block short-circuits; unless an active
//! override session covers that category, in which case the block is
//! recorded as bypassed and evaluation continues.
//!
//! The engine never commits anything. An [`Decision::AllowedWithOverride`]
//! obliges the caller to collect an operator reason and write the override
//! log entry before any ticket state changes.

use crate::overrides::OverrideSession;
use crate::types::{BlockReason, CapacityStatus, OverrideCategory, ReentryMode, Ticket};
use chrono::{DateTime, Utc};

/// Entry decision for one ticket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// All rules passed
    Allowed,
    /// One or more rules blocked but an active override covers them.
    ///
    /// Carries the first bypassed category/reason; commit is deferred until
    /// the operator supplies a reason.
    AllowedWithOverride {
        /// Category of the first bypassed rule
        category: OverrideCategory,
        /// The blocking reason that was bypassed
        bypassed: BlockReason,
    },
    /// A rule blocked and no override applies
    Blocked(BlockReason),
}

/// Full evaluation output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// The entry decision
    pub decision: Decision,
    /// Every rule that raised a block, in rule order (bypassed or not)
    pub blocks: Vec<BlockReason>,
    /// Side-channel obligation: identity must be verified after entry
    pub requires_id_check: bool,
    /// Exit-tracking venues: this scan flips the entry/exit toggle instead
    /// of consuming a fresh admission
    pub exit_toggle: bool,
}

impl Evaluation {
    /// Whether the scan may proceed to commit (directly or via override)
    #[must_use]
    pub const fn allowed(&self) -> bool {
        !matches!(self.decision, Decision::Blocked(_))
    }
}

/// The layered policy checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    /// Evaluate a ticket against the entry rules.
    ///
    /// Rule order is fixed: refund, duplicate-use, transfer, capacity. The
    /// ID-verification requirement never blocks; it surfaces as
    /// [`Evaluation::requires_id_check`].
    ///
    /// `capacity` is the engine's authoritative local snapshot; `None`
    /// means capacity is unknown, which never happens on the online path
    /// because callers queue instead of evaluating untrusted state.
    #[must_use]
    pub fn evaluate(
        ticket: &Ticket,
        capacity: Option<&CapacityStatus>,
        reentry_mode: ReentryMode,
        override_session: Option<&OverrideSession>,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let override_active = override_session.is_some_and(|s| s.is_active(now));
        let exit_toggle = reentry_mode == ReentryMode::ExitTracking && ticket.already_used();

        let mut blocks = Vec::new();
        let mut bypassed: Option<(OverrideCategory, BlockReason)> = None;
        let mut verdict: Option<BlockReason> = None;

        for (block, category) in [
            (Self::check_refund(ticket), OverrideCategory::Refund),
            (
                Self::check_duplicate(ticket, reentry_mode),
                OverrideCategory::Duplicate,
            ),
            (Self::check_transfer(ticket), OverrideCategory::Transfer),
            (
                Self::check_capacity(ticket, capacity, exit_toggle),
                OverrideCategory::Capacity,
            ),
        ] {
            let Some(reason) = block else { continue };
            blocks.push(reason);

            if override_active {
                // Record the first bypass and keep evaluating the rest
                if bypassed.is_none() {
                    bypassed = Some((category, reason));
                }
            } else if verdict.is_none() {
                verdict = Some(reason);
                // First un-bypassed block decides; later rules are recorded
                // for reporting only
            }
        }

        let decision = match (verdict, bypassed) {
            (Some(reason), _) => Decision::Blocked(reason),
            (None, Some((category, reason))) => Decision::AllowedWithOverride {
                category,
                bypassed: reason,
            },
            (None, None) => Decision::Allowed,
        };

        Evaluation {
            decision,
            blocks,
            requires_id_check: ticket.id_check_outstanding(),
            exit_toggle,
        }
    }

    /// Rule 1: refunded tickets do not grant entry.
    fn check_refund(ticket: &Ticket) -> Option<BlockReason> {
        ticket.is_refunded().then_some(BlockReason::Refunded)
    }

    /// Rule 2: duplicate use, governed by the venue re-entry policy.
    ///
    /// `Single` blocks a second presentation; `Reentry` and `ExitTracking`
    /// let scanned tickets through (`ExitTracking` flips the entry/exit
    /// toggle at commit time instead).
    fn check_duplicate(ticket: &Ticket, reentry_mode: ReentryMode) -> Option<BlockReason> {
        (ticket.already_used() && reentry_mode == ReentryMode::Single)
            .then_some(BlockReason::AlreadyUsed)
    }

    /// Rule 3: transferred tickets whose holder records don't match.
    fn check_transfer(ticket: &Ticket) -> Option<BlockReason> {
        ticket
            .transfer_unresolved()
            .then_some(BlockReason::Transferred)
    }

    /// Rule 4: committing this ticket must not exceed total or tier capacity.
    ///
    /// Exits (exit-tracking toggle for a holder going out or coming back)
    /// never consume a fresh admission, so capacity does not apply.
    fn check_capacity(
        ticket: &Ticket,
        capacity: Option<&CapacityStatus>,
        exit_toggle: bool,
    ) -> Option<BlockReason> {
        if exit_toggle {
            return None;
        }
        let capacity = capacity?;
        (!capacity.has_room() || !capacity.tier_has_room(&ticket.tier))
            .then_some(BlockReason::AtCapacity)
    }
}
