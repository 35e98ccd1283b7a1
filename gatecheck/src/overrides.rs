//! Time-boxed, audited rule bypass.
//!
//! An override session lets staff wave a ticket through a specific blocking
//! rule under accountability: at most one session is active process-wide,
//! it expires on a wall clock checked at point of use (no background timer),
//! and no bypass ever commits without a paired [`OverrideLogEntry`].

use crate::types::{OverrideCategory, OverrideLogId, ScanLogId, StaffId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An active override session.
///
/// Activating while a session is already active replaces it (resets the
/// clock); sessions never stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSession {
    /// Staff member who activated the session
    pub staff_id: StaffId,
    /// When the session was activated
    pub activated_at: DateTime<Utc>,
    /// When the session expires (activation + fixed duration)
    pub expires_at: DateTime<Utc>,
}

impl OverrideSession {
    /// Activate a session for the given staff member.
    #[must_use]
    pub fn activate(staff_id: StaffId, now: DateTime<Utc>, duration: Duration) -> Self {
        let lifetime = chrono::Duration::milliseconds(
            i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        );
        Self {
            staff_id,
            activated_at: now,
            expires_at: now + lifetime,
        }
    }

    /// Whether the session is still live at `now`.
    ///
    /// Expiry is enforced by this check at every point of use; there is no
    /// scheduler involved.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Remaining lifetime at `now`, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Why an override session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideEnd {
    /// Staff deactivated it
    Manual,
    /// The wall clock passed `expires_at`
    Expired,
    /// A new activation replaced it
    Replaced,
}

/// Audit record for one rule bypass.
///
/// Invariant: every scan committed with `override_used` set pairs with
/// exactly one of these, written before the ticket-state write so a failed
/// remote commit can never leave the audit trail empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideLogEntry {
    /// Unique entry identifier
    pub id: OverrideLogId,
    /// Ticket the bypass applied to
    pub ticket_id: TicketId,
    /// Staff member who authorized the bypass
    pub staff_id: StaffId,
    /// Rule category that was bypassed
    pub category: OverrideCategory,
    /// Operator-supplied reason (mandatory)
    pub reason: String,
    /// Optional free-form notes
    pub notes: Option<String>,
    /// Scan log row produced by the same commit
    pub scan_log_id: ScanLogId,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}
