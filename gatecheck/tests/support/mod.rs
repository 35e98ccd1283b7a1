//! Shared in-memory collaborators for integration tests.

#![allow(clippy::unwrap_used)]
#![allow(dead_code)] // each test binary uses a different subset

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatecheck::{
    AuditSink, CapacityProvider, CapacityStatus, CollaboratorError, Config, EventId, Gate,
    MemoryJournal, OverrideLogEntry, ScanLogEntry, ScanLogId, StaffId, Ticket, TicketId,
    TicketStatus, TicketStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use turnstile_core::environment::SystemClock;

/// In-memory backend with failure injection and audit recording.
#[derive(Default)]
pub struct TestBackend {
    tickets: Mutex<HashMap<TicketId, Ticket>>,
    by_token: Mutex<HashMap<String, TicketId>>,
    capacity: Mutex<HashMap<EventId, CapacityStatus>>,
    /// When false, every call fails with `Unavailable`
    reachable: AtomicBool,
    pub scan_logs: Mutex<Vec<ScanLogEntry>>,
    pub override_logs: Mutex<Vec<OverrideLogEntry>>,
    pub commit_order: Mutex<Vec<TicketId>>,
}

impl TestBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.reachable.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), CollaboratorError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CollaboratorError::Unavailable("injected outage".to_string()))
        }
    }

    pub fn insert_ticket(&self, ticket: Ticket) {
        self.by_token
            .lock()
            .unwrap()
            .insert(ticket.token.clone(), ticket.id);
        self.tickets.lock().unwrap().insert(ticket.id, ticket);
    }

    pub fn set_capacity(&self, status: CapacityStatus) {
        self.capacity.lock().unwrap().insert(status.event_id, status);
    }

    pub fn ticket(&self, id: TicketId) -> Ticket {
        self.tickets.lock().unwrap().get(&id).cloned().unwrap()
    }

    /// Refund a ticket behind the engine's back (e.g., while it is offline).
    pub fn refund(&self, id: TicketId) {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets.get_mut(&id).unwrap();
        ticket.status = TicketStatus::Refunded;
    }

    /// Mark a ticket used behind the engine's back (a concurrent device).
    pub fn use_elsewhere(&self, id: TicketId) {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets.get_mut(&id).unwrap();
        ticket.status = TicketStatus::Scanned;
        ticket.is_used = true;
    }

    pub fn scan_log_count(&self) -> usize {
        self.scan_logs.lock().unwrap().len()
    }

    pub fn override_log_entries(&self) -> Vec<OverrideLogEntry> {
        self.override_logs.lock().unwrap().clone()
    }

    pub fn committed(&self) -> Vec<TicketId> {
        self.commit_order.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketStore for TestBackend {
    async fn find_by_token(&self, token: &str) -> Result<Ticket, CollaboratorError> {
        self.guard()?;
        let id = *self
            .by_token
            .lock()
            .unwrap()
            .get(token)
            .ok_or(CollaboratorError::NotFound)?;
        self.tickets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }

    async fn find_by_id(&self, id: TicketId) -> Result<Ticket, CollaboratorError> {
        self.guard()?;
        self.tickets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }

    async fn mark_scanned(
        &self,
        id: TicketId,
        _scanner: StaffId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, CollaboratorError> {
        self.guard()?;
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets.get_mut(&id).ok_or(CollaboratorError::NotFound)?;
        ticket.status = TicketStatus::Scanned;
        ticket.is_used = true;
        ticket.scanned_at = Some(now);
        ticket.inside = true;
        self.commit_order.lock().unwrap().push(id);
        Ok(ticket.clone())
    }

    async fn set_inside(&self, id: TicketId, inside: bool) -> Result<Ticket, CollaboratorError> {
        self.guard()?;
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets.get_mut(&id).ok_or(CollaboratorError::NotFound)?;
        ticket.inside = inside;
        self.commit_order.lock().unwrap().push(id);
        Ok(ticket.clone())
    }
}

#[async_trait]
impl CapacityProvider for TestBackend {
    async fn capacity_for(&self, event_id: EventId) -> Result<CapacityStatus, CollaboratorError> {
        self.guard()?;
        self.capacity
            .lock()
            .unwrap()
            .get(&event_id)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }
}

#[async_trait]
impl AuditSink for TestBackend {
    async fn log_scan(&self, entry: ScanLogEntry) -> Result<ScanLogId, CollaboratorError> {
        self.guard()?;
        self.scan_logs.lock().unwrap().push(entry);
        Ok(ScanLogId::new())
    }

    async fn log_override(&self, entry: OverrideLogEntry) -> Result<(), CollaboratorError> {
        self.guard()?;
        self.override_logs.lock().unwrap().push(entry);
        Ok(())
    }
}

/// A config tuned for fast tests: tiny debounce window, no cool-down.
pub fn fast_config() -> Config {
    let mut config = Config::with_secret("test-secret");
    config.debounce_window_ms = 10;
    config.result_cooldown_secs = 0;
    config
}

/// Build a gate over the given backend with an in-memory journal.
pub fn gate_over(backend: &Arc<TestBackend>, config: &Config) -> Gate {
    Gate::new(
        config,
        Arc::new(SystemClock),
        Arc::clone(backend) as Arc<dyn TicketStore>,
        Arc::clone(backend) as Arc<dyn CapacityProvider>,
        Arc::clone(backend) as Arc<dyn AuditSink>,
        Arc::new(MemoryJournal::new()),
    )
    .unwrap()
}

/// A plain issued ticket for an event.
pub fn issued_ticket(event_id: EventId, token: &str, holder: &str) -> Ticket {
    Ticket {
        id: TicketId::new(),
        token: token.to_string(),
        event_id,
        tier: "General".to_string(),
        holder_name: holder.to_string(),
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

/// Sleep long enough for the debounce window + cool-down of `fast_config`
/// to clear.
pub async fn let_debounce_clear() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
