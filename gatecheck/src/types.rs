//! Domain types for the scan validation engine.
//!
//! This module contains the identifiers, entities, and value objects the
//! engine works with: tickets and their lifecycle, scan attempts and results,
//! capacity snapshots, and the venue re-entry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a ticket
    TicketId
}

uuid_id! {
    /// Unique identifier for a venue event
    EventId
}

uuid_id! {
    /// Unique identifier for a staff member / scanner operator
    StaffId
}

uuid_id! {
    /// Unique identifier for one scan attempt (one credential presentation)
    AttemptId
}

uuid_id! {
    /// Unique identifier for a scan log row written by the audit sink
    ScanLogId
}

uuid_id! {
    /// Unique identifier for an override log entry
    OverrideLogId
}

// ============================================================================
// Ticket
// ============================================================================

/// Ticket lifecycle status as recorded by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Issued and not yet presented at the gate
    Issued,
    /// Presented and admitted at least once
    Scanned,
    /// Refunded; must not grant entry without an override
    Refunded,
}

/// Ownership transfer record attached to a ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// Holder the ticket was originally issued to
    pub from_holder: String,
    /// Holder the ticket was transferred to
    pub to_holder: String,
    /// When the transfer happened
    pub transferred_at: DateTime<Utc>,
}

/// Refund record attached to a ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInfo {
    /// When the refund was issued
    pub refunded_at: DateTime<Utc>,
    /// Backend reference for the refund transaction
    pub reference: String,
}

/// A ticket as the engine sees it.
///
/// Owned by the backend ticket store; the engine holds a read copy and never
/// treats it as the source of truth, except for locally-queued writes that
/// are still awaiting sync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,
    /// Opaque credential token (may rotate between presentations)
    pub token: String,
    /// Event this ticket admits to
    pub event_id: EventId,
    /// Tier / ticket type name (e.g., "VIP", "General")
    pub tier: String,
    /// Name of the current holder on record
    pub holder_name: String,
    /// Lifecycle status
    pub status: TicketStatus,
    /// When the ticket was first scanned (None if never)
    pub scanned_at: Option<DateTime<Utc>>,
    /// Whether the ticket has been used for entry
    pub is_used: bool,
    /// Ownership transfer record, if the ticket changed hands
    pub transfer: Option<TransferInfo>,
    /// Refund record, if the ticket was refunded
    pub refund: Option<RefundInfo>,
    /// Whether this tier mandates an identity check at the gate
    pub requires_id_check: bool,
    /// Whether the identity check has already been performed
    pub id_verified: bool,
    /// Whether the holder is currently inside the venue (exit-tracking mode)
    pub inside: bool,
}

impl Ticket {
    /// Whether the ticket was refunded
    #[must_use]
    pub const fn is_refunded(&self) -> bool {
        matches!(self.status, TicketStatus::Refunded)
    }

    /// Whether the ticket has already been presented and admitted
    #[must_use]
    pub const fn already_used(&self) -> bool {
        self.is_used || matches!(self.status, TicketStatus::Scanned)
    }

    /// Whether holder records still disagree with a recorded transfer
    ///
    /// A transferred ticket whose holder name was never updated to the
    /// transferee is flagged for staff attention.
    #[must_use]
    pub fn transfer_unresolved(&self) -> bool {
        self.transfer
            .as_ref()
            .is_some_and(|t| t.to_holder != self.holder_name)
    }

    /// Whether an identity check is still outstanding for this ticket
    #[must_use]
    pub const fn id_check_outstanding(&self) -> bool {
        self.requires_id_check && !self.id_verified
    }
}

// ============================================================================
// Scan input
// ============================================================================

/// How the credential reached the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMethod {
    /// Camera-decoded QR payload
    Qr,
    /// NFC tag read
    Nfc,
    /// Manually typed ticket identifier
    Manual,
}

impl ScanMethod {
    /// Stable wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Nfc => "nfc",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One credential presentation, created per input and discarded once a
/// [`ScanResult`] has been produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAttempt {
    /// Unique identifier for this presentation
    pub attempt_id: AttemptId,
    /// Raw credential payload exactly as scanned or typed
    pub raw_payload: String,
    /// Input channel
    pub method: ScanMethod,
    /// When the credential was presented
    pub presented_at: DateTime<Utc>,
    /// Operator running the scanner
    pub staff_id: StaffId,
}

// ============================================================================
// Scan outcome
// ============================================================================

/// Why a scan was blocked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    /// Ticket was refunded
    Refunded,
    /// Ticket already used and re-entry is disabled
    AlreadyUsed,
    /// Ticket was transferred and holder records don't match
    Transferred,
    /// Event or tier is at capacity
    AtCapacity,
    /// Credential failed signature or structure validation
    CredentialInvalid,
    /// No ticket matches the credential
    NotFound,
    /// Ticket is already waiting in the batch approval queue
    DuplicateInQueue,
}

impl BlockReason {
    /// Stable wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Refunded => "refunded",
            Self::AlreadyUsed => "used",
            Self::Transferred => "transferred",
            Self::AtCapacity => "at_capacity",
            Self::CredentialInvalid => "credential_invalid",
            Self::NotFound => "not_found",
            Self::DuplicateInQueue => "duplicate_in_queue",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse outcome tag consumed by UI and audio layers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    /// Entry granted
    Valid,
    /// Ticket already used
    Used,
    /// Credential or ticket rejected
    Invalid,
    /// Captured offline, awaiting sync
    Queued,
}

/// The immutable outcome of one scan attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Outcome tag
    pub outcome: ScanOutcome,
    /// Resolved ticket, when one was found
    pub ticket: Option<Ticket>,
    /// Human-readable message for the operator
    pub message: String,
    /// Specific blocking reason, when blocked
    pub block: Option<BlockReason>,
    /// Transfer details surfaced with transfer blocks
    pub transfer: Option<TransferInfo>,
    /// Refund details surfaced with refund blocks
    pub refund: Option<RefundInfo>,
    /// Override category that was used to bypass a block, if any
    pub override_used: Option<OverrideCategory>,
    /// Post-entry obligation: operator must verify the holder's identity
    pub requires_id_check: bool,
}

impl ScanResult {
    /// Entry granted
    #[must_use]
    pub fn valid(ticket: Ticket, message: impl Into<String>) -> Self {
        let requires_id_check = ticket.id_check_outstanding();
        Self {
            outcome: ScanOutcome::Valid,
            ticket: Some(ticket),
            message: message.into(),
            block: None,
            transfer: None,
            refund: None,
            override_used: None,
            requires_id_check,
        }
    }

    /// Blocked with a specific reason; outcome tag derived from the reason
    #[must_use]
    pub fn blocked(ticket: Option<Ticket>, reason: BlockReason, message: impl Into<String>) -> Self {
        let outcome = match reason {
            BlockReason::AlreadyUsed | BlockReason::DuplicateInQueue => ScanOutcome::Used,
            _ => ScanOutcome::Invalid,
        };
        let transfer = ticket.as_ref().and_then(|t| t.transfer.clone());
        let refund = ticket.as_ref().and_then(|t| t.refund.clone());
        Self {
            outcome,
            ticket,
            message: message.into(),
            block: Some(reason),
            transfer,
            refund,
            override_used: None,
            requires_id_check: false,
        }
    }

    /// Captured offline, awaiting sync
    #[must_use]
    pub fn queued(message: impl Into<String>) -> Self {
        Self {
            outcome: ScanOutcome::Queued,
            ticket: None,
            message: message.into(),
            block: None,
            transfer: None,
            refund: None,
            override_used: None,
            requires_id_check: false,
        }
    }

    /// Mark this result as committed under an override
    #[must_use]
    pub fn with_override(mut self, category: OverrideCategory) -> Self {
        self.override_used = Some(category);
        self
    }

    /// Bridge to the error taxonomy for callers that want `Result` semantics.
    ///
    /// Admitted and queued scans have no error; blocked scans map onto
    /// [`crate::error::ScanError`].
    #[must_use]
    pub fn as_error(&self) -> Option<crate::error::ScanError> {
        use crate::error::ScanError;
        match self.block? {
            BlockReason::CredentialInvalid => {
                Some(ScanError::CredentialInvalid(self.message.clone()))
            },
            BlockReason::NotFound => Some(ScanError::TicketNotFound),
            reason => Some(ScanError::RuleBlocked(reason)),
        }
    }
}

// ============================================================================
// Capacity
// ============================================================================

/// Occupancy counters for a single tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapacity {
    /// Tier capacity
    pub total: u32,
    /// Currently admitted holders in this tier
    pub current: u32,
}

impl TierCapacity {
    /// Create a tier capacity snapshot
    #[must_use]
    pub const fn new(total: u32, current: u32) -> Self {
        Self { total, current }
    }

    /// Whether one more admission fits
    #[must_use]
    pub const fn has_room(&self) -> bool {
        self.current < self.total
    }
}

/// Per-event occupancy versus capacity, optionally per tier.
///
/// Derived state: recomputed after every committed valid scan. The engine
/// keeps an authoritative local copy that is advanced inside the commit path,
/// so `current <= total` holds for every commit that did not use an override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityStatus {
    /// Event this snapshot belongs to
    pub event_id: EventId,
    /// Total venue capacity for the event
    pub total: u32,
    /// Currently admitted holders
    pub current: u32,
    /// Optional per-tier counters, keyed by tier name
    pub tiers: HashMap<String, TierCapacity>,
}

impl CapacityStatus {
    /// Create a capacity snapshot without tier breakdown
    #[must_use]
    pub fn new(event_id: EventId, total: u32, current: u32) -> Self {
        Self {
            event_id,
            total,
            current,
            tiers: HashMap::new(),
        }
    }

    /// Add a tier counter
    #[must_use]
    pub fn with_tier(mut self, name: impl Into<String>, tier: TierCapacity) -> Self {
        self.tiers.insert(name.into(), tier);
        self
    }

    /// Whether one more admission fits overall
    #[must_use]
    pub const fn has_room(&self) -> bool {
        self.current < self.total
    }

    /// Whether one more admission fits in the given tier
    ///
    /// Tiers without a counter fall back to the overall check.
    #[must_use]
    pub fn tier_has_room(&self, tier: &str) -> bool {
        self.tiers.get(tier).is_none_or(TierCapacity::has_room)
    }

    /// Remaining overall admissions
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.current)
    }

    /// Record one admission (overall and tier counters)
    pub fn record_admission(&mut self, tier: &str) {
        self.current += 1;
        if let Some(t) = self.tiers.get_mut(tier) {
            t.current += 1;
        }
    }

    /// Record one exit (overall and tier counters)
    pub fn record_exit(&mut self, tier: &str) {
        self.current = self.current.saturating_sub(1);
        if let Some(t) = self.tiers.get_mut(tier) {
            t.current = t.current.saturating_sub(1);
        }
    }
}

// ============================================================================
// Policy enums
// ============================================================================

/// Venue policy for repeated presentations of the same ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReentryMode {
    /// One entry per ticket; second presentation blocks as used
    #[default]
    Single,
    /// Scanned tickets may re-enter freely
    Reentry,
    /// Scans alternate between entry and exit for occupancy tracking
    ExitTracking,
}

impl ReentryMode {
    /// Parse from a config string
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "reentry" => Some(Self::Reentry),
            "exit_tracking" => Some(Self::ExitTracking),
            _ => None,
        }
    }
}

/// Rule category an override can bypass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideCategory {
    /// Refunded-ticket block
    Refund,
    /// Duplicate-use block
    Duplicate,
    /// Transfer / name-mismatch block
    Transfer,
    /// Capacity block
    Capacity,
}

impl OverrideCategory {
    /// Stable wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Refund => "refund",
            Self::Duplicate => "duplicate",
            Self::Transfer => "transfer",
            Self::Capacity => "capacity",
        }
    }
}

impl fmt::Display for OverrideCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Batch approval
// ============================================================================

/// A provisionally-valid scan held for supervised group approval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Ticket waiting for approval
    pub ticket_id: TicketId,
    /// Holder name for the approval list UI
    pub holder_name: String,
    /// Tier name for the approval list UI
    pub tier: String,
    /// The original provisional result
    pub result: ScanResult,
    /// When the entry joined the queue
    pub added_at: DateTime<Utc>,
}

/// Result of a bulk batch approval
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatchOutcome {
    /// Entries committed successfully
    pub processed: u32,
    /// Entries that failed re-validation or commit, with reasons
    pub errors: Vec<(TicketId, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            id: TicketId::new(),
            token: "tok".to_string(),
            event_id: EventId::new(),
            tier: "General".to_string(),
            holder_name: "Dana".to_string(),
            status: TicketStatus::Issued,
            scanned_at: None,
            is_used: false,
            transfer: None,
            refund: None,
            requires_id_check: false,
            id_verified: false,
            inside: false,
        }
    }

    #[test]
    fn transfer_unresolved_only_when_names_disagree() {
        let mut t = ticket();
        assert!(!t.transfer_unresolved());

        t.transfer = Some(TransferInfo {
            from_holder: "Dana".to_string(),
            to_holder: "Robin".to_string(),
            transferred_at: Utc::now(),
        });
        assert!(t.transfer_unresolved());

        t.holder_name = "Robin".to_string();
        assert!(!t.transfer_unresolved());
    }

    #[test]
    fn blocked_result_derives_outcome_from_reason() {
        let r = ScanResult::blocked(None, BlockReason::AlreadyUsed, "used");
        assert_eq!(r.outcome, ScanOutcome::Used);

        let r = ScanResult::blocked(None, BlockReason::Refunded, "refunded");
        assert_eq!(r.outcome, ScanOutcome::Invalid);
    }

    #[test]
    fn capacity_tier_falls_back_to_overall() {
        let cap = CapacityStatus::new(EventId::new(), 10, 3);
        assert!(cap.tier_has_room("VIP"));

        let cap = cap.with_tier("VIP", TierCapacity::new(2, 2));
        assert!(!cap.tier_has_room("VIP"));
        assert!(cap.tier_has_room("General"));
    }

    #[test]
    fn capacity_admission_and_exit_roundtrip() {
        let mut cap =
            CapacityStatus::new(EventId::new(), 10, 0).with_tier("VIP", TierCapacity::new(2, 0));
        cap.record_admission("VIP");
        assert_eq!(cap.current, 1);
        assert_eq!(cap.tiers["VIP"].current, 1);
        cap.record_exit("VIP");
        assert_eq!(cap.current, 0);
        assert_eq!(cap.tiers["VIP"].current, 0);
    }

    #[test]
    fn result_error_bridge_follows_the_taxonomy() {
        use crate::error::ScanError;

        let valid = ScanResult::valid(ticket(), "ok");
        assert!(valid.as_error().is_none());

        let used = ScanResult::blocked(None, BlockReason::AlreadyUsed, "used");
        assert_eq!(
            used.as_error(),
            Some(ScanError::RuleBlocked(BlockReason::AlreadyUsed))
        );

        let missing = ScanResult::blocked(None, BlockReason::NotFound, "missing");
        assert_eq!(missing.as_error(), Some(ScanError::TicketNotFound));
    }

    #[test]
    fn reentry_mode_parses_config_names() {
        assert_eq!(ReentryMode::parse("single"), Some(ReentryMode::Single));
        assert_eq!(ReentryMode::parse("Reentry"), Some(ReentryMode::Reentry));
        assert_eq!(
            ReentryMode::parse("exit_tracking"),
            Some(ReentryMode::ExitTracking)
        );
        assert_eq!(ReentryMode::parse("bogus"), None);
    }
}
