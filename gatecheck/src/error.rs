//! Error taxonomy for the scan validation engine.

use crate::types::BlockReason;
use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Propagation policy: the rule engine and credential verifier never leak
/// errors past the scan coordinator; every scan resolves to a `ScanResult`
/// or a queued state. Only [`ScanError::Configuration`] is a hard startup
/// failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Bad signature or malformed payload. Reported to the operator, never retried.
    #[error("invalid credential: {0}")]
    CredentialInvalid(String),

    /// No ticket matches the presented credential.
    #[error("ticket not found")]
    TicketNotFound,

    /// A business rule blocked the scan.
    #[error("scan blocked: {0}")]
    RuleBlocked(BlockReason),

    /// Missing signing secret or unavailable crypto primitive.
    ///
    /// Fatal: the engine refuses to start rather than silently accept
    /// unsigned credentials.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend unreachable or timed out.
    ///
    /// Never surfaced as a denial; the attempt is queued and retried.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The durable offline journal failed.
    #[error("journal error: {0}")]
    Journal(String),

    /// Waiting for the engine's response timed out or the engine shut down.
    #[error("engine unavailable: {0}")]
    Engine(String),
}

/// Failure signal from a backend collaborator (ticket store, capacity
/// provider, audit sink).
///
/// Distinguishes "definitely absent" from "could not reach the backend":
/// the coordinator queues on [`CollaboratorError::Unavailable`] but rejects
/// on [`CollaboratorError::NotFound`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The record does not exist.
    #[error("not found")]
    NotFound,

    /// The backend could not be reached or timed out.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Whether retrying later could succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<CollaboratorError> for ScanError {
    fn from(error: CollaboratorError) -> Self {
        match error {
            CollaboratorError::NotFound => Self::TicketNotFound,
            CollaboratorError::Unavailable(detail) => Self::TransientNetwork(detail),
        }
    }
}
