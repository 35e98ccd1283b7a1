//! Override workflow: activation, reason capture, audit pairing, expiry.
//!
//! Run with: `cargo test --test override_flow_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod support;

use gatecheck::{
    BlockReason, CapacityStatus, EventId, OverrideCategory, ScanMethod, ScanOutcome, ScanResponse,
    StaffId, TicketStatus,
};
use support::{TestBackend, fast_config, gate_over, issued_ticket, let_debounce_clear};

/// Capacity 2/2 full, no override: blocked. With an active capacity
/// override and the reason "fire marshal exception": committed and logged
/// exactly once.
#[tokio::test]
async fn capacity_override_commits_with_one_log_entry() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 2, 2));
    let ticket = issued_ticket(event_id, "TKT-1", "Alice");
    let ticket_id = ticket.id;
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();

    // Without an override: blocked at capacity
    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.block, Some(BlockReason::AtCapacity));
    let_debounce_clear().await;

    // Activate override and rescan: suspended for a reason
    gate.activate_override(staff).await.unwrap();
    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::AwaitingOverrideReason {
        attempt_id,
        category,
        ..
    } = response
    else {
        panic!("expected override prompt, got {response:?}");
    };
    assert_eq!(category, OverrideCategory::Capacity);

    // Nothing committed while suspended
    assert!(!backend.ticket(ticket_id).is_used);

    let result = gate
        .supply_override_reason(attempt_id, "fire marshal exception", None)
        .await
        .unwrap();
    assert_eq!(result.outcome, ScanOutcome::Valid);
    assert_eq!(result.override_used, Some(OverrideCategory::Capacity));

    // Committed, and exactly one override log entry pairs with it
    assert!(backend.ticket(ticket_id).is_used);
    let overrides = backend.override_log_entries();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].ticket_id, ticket_id);
    assert_eq!(overrides[0].category, OverrideCategory::Capacity);
    assert_eq!(overrides[0].reason, "fire marshal exception");

    // The scan log row carries the override flag and reason
    let logs = backend.scan_logs.lock().unwrap();
    let committed_row = logs
        .iter()
        .find(|l| l.override_used.is_some())
        .expect("override-flagged scan log row");
    assert_eq!(
        committed_row.override_reason.as_deref(),
        Some("fire marshal exception")
    );
}

#[tokio::test]
async fn refund_override_requires_reason_before_commit() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    let mut ticket = issued_ticket(event_id, "TKT-1", "Alice");
    ticket.status = TicketStatus::Refunded;
    let ticket_id = ticket.id;
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();
    gate.activate_override(staff).await.unwrap();

    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::AwaitingOverrideReason { attempt_id, category, .. } = response else {
        panic!("expected override prompt");
    };
    assert_eq!(category, OverrideCategory::Refund);

    // An empty reason is refused outright
    let err = gate
        .supply_override_reason(attempt_id, "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, gatecheck::ScanError::Engine(_)));
    assert!(!backend.ticket(ticket_id).is_used);

    // A real reason commits
    let result = gate
        .supply_override_reason(attempt_id, "refund reversed at box office", None)
        .await
        .unwrap();
    assert_eq!(result.override_used, Some(OverrideCategory::Refund));
    assert!(backend.ticket(ticket_id).is_used);
}

#[tokio::test]
async fn cancelling_the_prompt_leaves_no_trace() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 2, 2));
    let ticket = issued_ticket(event_id, "TKT-1", "Alice");
    let ticket_id = ticket.id;
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();
    gate.activate_override(staff).await.unwrap();

    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::AwaitingOverrideReason { attempt_id, .. } = response else {
        panic!("expected override prompt");
    };

    gate.cancel_override_reason(attempt_id).await.unwrap();

    // Ticket untouched, no override logged, capacity unchanged
    assert!(!backend.ticket(ticket_id).is_used);
    assert!(backend.override_log_entries().is_empty());
    assert_eq!(gate.capacity_status(event_id).await.unwrap().current, 2);

    // The key was released immediately: the same credential can be
    // presented again right away.
    let_debounce_clear().await;
    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    assert!(matches!(
        response,
        ScanResponse::AwaitingOverrideReason { .. }
    ));
}

#[tokio::test]
async fn deactivated_override_no_longer_bypasses() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 2, 2));
    backend.insert_ticket(issued_ticket(event_id, "TKT-1", "Alice"));

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();

    gate.activate_override(staff).await.unwrap();
    assert!(gate.override_session().await.is_some());

    gate.deactivate_override().await.unwrap();
    assert!(gate.override_session().await.is_none());

    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.block, Some(BlockReason::AtCapacity));
}

#[tokio::test]
async fn activation_returns_expiry_and_replaces() {
    let backend = TestBackend::new();
    let gate = gate_over(&backend, &fast_config());

    let first_staff = StaffId::new();
    let first_expiry = gate.activate_override(first_staff).await.unwrap();

    let second_staff = StaffId::new();
    let second_expiry = gate.activate_override(second_staff).await.unwrap();
    assert!(second_expiry >= first_expiry);

    let session = gate.override_session().await.unwrap();
    assert_eq!(session.staff_id, second_staff);
}

#[tokio::test]
async fn override_never_applies_without_matching_block() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    let ticket = issued_ticket(event_id, "TKT-1", "Alice");
    let ticket_id = ticket.id;
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();
    gate.activate_override(staff).await.unwrap();

    // A clean ticket commits directly; no override is consumed or logged
    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.outcome, ScanOutcome::Valid);
    assert!(result.override_used.is_none());
    assert!(backend.override_log_entries().is_empty());
    assert!(backend.ticket(ticket_id).is_used);
}
