//! Backend collaborator interfaces.
//!
//! The engine never owns tickets, capacity, or audit rows; it talks to a
//! hosted backend through these traits. Implementations are injected via the
//! scan environment; tests use in-memory fakes, production wires the remote
//! client. Every method distinguishes "record absent" from "backend
//! unreachable" so a transient network failure is never read as an invalid
//! ticket.

use crate::error::CollaboratorError;
use crate::overrides::OverrideLogEntry;
use crate::types::{
    BlockReason, CapacityStatus, EventId, OverrideCategory, ScanLogId, ScanMethod, ScanOutcome,
    StaffId, Ticket, TicketId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the scan log written for every committed or blocked scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    /// Ticket the scan resolved to (absent for unresolvable credentials)
    pub ticket_id: Option<TicketId>,
    /// Operator who ran the scan
    pub staff_id: StaffId,
    /// Input channel
    pub method: ScanMethod,
    /// Outcome tag
    pub outcome: ScanOutcome,
    /// Blocking reason when blocked
    pub block: Option<BlockReason>,
    /// Override category when the commit bypassed a rule
    pub override_used: Option<OverrideCategory>,
    /// Operator-supplied override reason, when applicable
    pub override_reason: Option<String>,
    /// When the scan happened
    pub scanned_at: DateTime<Utc>,
}

/// Read/write access to the backend ticket records.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Resolve a credential token to a ticket.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::NotFound`] when no ticket carries the token,
    /// [`CollaboratorError::Unavailable`] when the backend cannot be reached.
    async fn find_by_token(&self, token: &str) -> Result<Ticket, CollaboratorError>;

    /// Fetch a ticket by id.
    ///
    /// # Errors
    ///
    /// Same contract as [`TicketStore::find_by_token`].
    async fn find_by_id(&self, id: TicketId) -> Result<Ticket, CollaboratorError>;

    /// Mark a ticket scanned and return the updated record.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Unavailable`] on transient backend failure; the
    /// caller routes that to the offline queue rather than denying entry.
    async fn mark_scanned(
        &self,
        id: TicketId,
        scanner: StaffId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, CollaboratorError>;

    /// Flip the inside/outside flag for exit-tracking venues.
    ///
    /// # Errors
    ///
    /// Same contract as [`TicketStore::mark_scanned`].
    async fn set_inside(&self, id: TicketId, inside: bool) -> Result<Ticket, CollaboratorError>;
}

/// Read access to event capacity.
#[async_trait]
pub trait CapacityProvider: Send + Sync {
    /// Current occupancy versus capacity for an event.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Unavailable`] when the backend cannot be
    /// reached; capacity cannot be trusted offline, so the caller queues.
    async fn capacity_for(&self, event_id: EventId) -> Result<CapacityStatus, CollaboratorError>;
}

/// Destination for the audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one scan log row and return its id.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Unavailable`] on transient failure.
    async fn log_scan(&self, entry: ScanLogEntry) -> Result<ScanLogId, CollaboratorError>;

    /// Append one override log entry.
    ///
    /// Called after [`AuditSink::log_scan`] for the same commit, referencing
    /// the returned scan log id.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Unavailable`] on transient failure.
    async fn log_override(&self, entry: OverrideLogEntry) -> Result<(), CollaboratorError>;
}
