//! Environment for the scan reducer.
//!
//! All external dependencies (clock, credential verification, backend
//! collaborators, the durable journal) are injected here. Production wires
//! remote clients; tests wire in-memory fakes.

use crate::config::Timings;
use crate::credential::CredentialVerifier;
use crate::journal::ScanJournal;
use crate::providers::{AuditSink, CapacityProvider, TicketStore};
use std::sync::Arc;
use turnstile_core::environment::Clock;

/// Injected dependencies for the scan coordinator.
#[derive(Clone)]
pub struct ScanEnv {
    /// Clock (system in production, fixed/stepping in tests)
    pub clock: Arc<dyn Clock>,
    /// Credential signature verification
    pub verifier: Arc<CredentialVerifier>,
    /// Backend ticket records
    pub tickets: Arc<dyn TicketStore>,
    /// Backend capacity snapshots
    pub capacity: Arc<dyn CapacityProvider>,
    /// Audit trail destination
    pub audit: Arc<dyn AuditSink>,
    /// Durable backing for the offline queue
    pub journal: Arc<dyn ScanJournal>,
    /// Timing knobs copied out of the config
    pub timings: Timings,
}

impl ScanEnv {
    /// Assemble an environment.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        verifier: Arc<CredentialVerifier>,
        tickets: Arc<dyn TicketStore>,
        capacity: Arc<dyn CapacityProvider>,
        audit: Arc<dyn AuditSink>,
        journal: Arc<dyn ScanJournal>,
        timings: Timings,
    ) -> Self {
        Self {
            clock,
            verifier,
            tickets,
            capacity,
            audit,
            journal,
            timings,
        }
    }
}
