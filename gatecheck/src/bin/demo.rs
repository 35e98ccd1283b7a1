//! Interactive-ish walkthrough of the scan engine against in-memory
//! collaborators: a valid scan, a duplicate, an offline capture with sync,
//! and a capacity override.
//!
//! Run with: `GATECHECK_SIGNING_SECRET=demo-secret cargo run --bin demo`

#![allow(clippy::print_stdout)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatecheck::{
    AuditSink, CapacityProvider, CapacityStatus, CollaboratorError, Config, EventId, Gate,
    MemoryJournal, OverrideLogEntry, ScanLogEntry, ScanLogId, ScanMethod, ScanResponse, StaffId,
    Ticket, TicketId, TicketStatus, TicketStore,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use turnstile_core::environment::SystemClock;

/// In-memory ticket backend for the walkthrough.
#[derive(Default)]
struct DemoBackend {
    tickets: Mutex<HashMap<TicketId, Ticket>>,
    by_token: Mutex<HashMap<String, TicketId>>,
    capacity: Mutex<HashMap<EventId, CapacityStatus>>,
    online: Mutex<bool>,
}

impl DemoBackend {
    fn insert(&self, ticket: Ticket) {
        self.by_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(ticket.token.clone(), ticket.id);
        self.tickets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(ticket.id, ticket);
    }

    fn set_capacity(&self, status: CapacityStatus) {
        self.capacity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(status.event_id, status);
    }

    fn set_online(&self, online: bool) {
        *self
            .online
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = online;
    }

    fn check_online(&self) -> Result<(), CollaboratorError> {
        if *self
            .online
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
        {
            Ok(())
        } else {
            Err(CollaboratorError::Unavailable(
                "network cable unplugged".to_string(),
            ))
        }
    }
}

#[async_trait]
impl TicketStore for DemoBackend {
    async fn find_by_token(&self, token: &str) -> Result<Ticket, CollaboratorError> {
        self.check_online()?;
        let id = *self
            .by_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(token)
            .ok_or(CollaboratorError::NotFound)?;
        self.find_by_id(id).await
    }

    async fn find_by_id(&self, id: TicketId) -> Result<Ticket, CollaboratorError> {
        self.check_online()?;
        self.tickets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
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
        self.check_online()?;
        let mut tickets = self
            .tickets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let ticket = tickets.get_mut(&id).ok_or(CollaboratorError::NotFound)?;
        ticket.status = TicketStatus::Scanned;
        ticket.is_used = true;
        ticket.scanned_at = Some(now);
        ticket.inside = true;
        Ok(ticket.clone())
    }

    async fn set_inside(&self, id: TicketId, inside: bool) -> Result<Ticket, CollaboratorError> {
        self.check_online()?;
        let mut tickets = self
            .tickets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let ticket = tickets.get_mut(&id).ok_or(CollaboratorError::NotFound)?;
        ticket.inside = inside;
        Ok(ticket.clone())
    }
}

#[async_trait]
impl CapacityProvider for DemoBackend {
    async fn capacity_for(&self, event_id: EventId) -> Result<CapacityStatus, CollaboratorError> {
        self.check_online()?;
        self.capacity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&event_id)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }
}

#[async_trait]
impl AuditSink for DemoBackend {
    async fn log_scan(&self, entry: ScanLogEntry) -> Result<ScanLogId, CollaboratorError> {
        tracing::debug!(?entry, "scan log row");
        Ok(ScanLogId::new())
    }

    async fn log_override(&self, entry: OverrideLogEntry) -> Result<(), CollaboratorError> {
        println!(
            "  [audit] override logged: ticket={} category={} reason={:?}",
            entry.ticket_id, entry.category, entry.reason
        );
        Ok(())
    }
}

fn demo_ticket(event_id: EventId, token: &str, holder: &str) -> Ticket {
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

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().unwrap_or_else(|_| Config::with_secret("demo-secret"));

    let backend = Arc::new(DemoBackend::default());
    backend.set_online(true);

    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 2, 0));
    backend.insert(demo_ticket(event_id, "TKT-ALPHA", "Alice"));
    backend.insert(demo_ticket(event_id, "TKT-BRAVO", "Bob"));
    backend.insert(demo_ticket(event_id, "TKT-CHARLIE", "Carol"));

    let gate = Gate::new(
        &config,
        Arc::new(SystemClock),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Arc::new(MemoryJournal::new()),
    )?;
    let staff = StaffId::new();

    println!("== 1. Valid scan");
    let response = gate.process_scan("TKT-ALPHA", ScanMethod::Qr, staff).await?;
    println!("  {response:?}");

    println!("== 2. Duplicate scan (same credential, still in cool-down)");
    let response = gate.process_scan("TKT-ALPHA", ScanMethod::Qr, staff).await?;
    println!("  {response:?}");

    println!("== 3. Offline capture");
    backend.set_online(false);
    gate.set_connectivity(false).await?;
    let response = gate.process_scan("TKT-BRAVO", ScanMethod::Nfc, staff).await?;
    println!("  {response:?}");

    println!("== 4. Reconnect and sync");
    backend.set_online(true);
    gate.set_connectivity(true).await?;
    let summary = gate.sync_now().await?;
    println!(
        "  synced={} blocked={} failed={} (total {})",
        summary.synced, summary.blocked, summary.failed, summary.total
    );

    println!("== 5. Capacity block and override (capacity is 2/2 now)");
    let response = gate
        .process_scan("TKT-CHARLIE", ScanMethod::Qr, staff)
        .await?;
    println!("  without override: {response:?}");

    gate.activate_override(staff).await?;
    // Cool-down from the blocked attempt would debounce an immediate rescan
    tokio::time::sleep(config.result_cooldown() + std::time::Duration::from_millis(100)).await;
    match gate
        .process_scan("TKT-CHARLIE", ScanMethod::Qr, staff)
        .await?
    {
        ScanResponse::AwaitingOverrideReason { attempt_id, .. } => {
            let result = gate
                .supply_override_reason(attempt_id, "fire marshal exception", None)
                .await?;
            println!("  with override: {} ({:?})", result.message, result.outcome);
        },
        other => println!("  unexpected: {other:?}"),
    }

    if let Ok(capacity) = gate.capacity_status(event_id).await {
        println!(
            "== Final occupancy: {}/{} (override pushed past capacity, audited)",
            capacity.current, capacity.total
        );
    }

    gate.shutdown(std::time::Duration::from_secs(5)).await.ok();
    Ok(())
}
