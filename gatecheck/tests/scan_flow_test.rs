//! End-to-end scan flows through the gate facade.
//!
//! Run with: `cargo test --test scan_flow_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod support;

use gatecheck::{
    BlockReason, CapacityStatus, EventId, ReentryMode, ScanMethod, ScanOutcome, ScanResponse,
    StaffId, TransferInfo,
};
use support::{TestBackend, fast_config, gate_over, issued_ticket, let_debounce_clear};

#[tokio::test]
async fn valid_scan_commits_and_logs() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    let ticket = issued_ticket(event_id, "TKT-1", "Alice");
    let ticket_id = ticket.id;
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let response = gate
        .process_scan("TKT-1", ScanMethod::Qr, StaffId::new())
        .await
        .unwrap();

    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result, got {response:?}");
    };
    assert_eq!(result.outcome, ScanOutcome::Valid);
    assert!(result.block.is_none());

    // Backend state committed
    let stored = backend.ticket(ticket_id);
    assert!(stored.is_used);
    assert!(stored.scanned_at.is_some());

    // Exactly one audit row for the commit
    assert_eq!(backend.scan_log_count(), 1);

    // Capacity advanced
    let capacity = gate.capacity_status(event_id).await.unwrap();
    assert_eq!(capacity.current, 1);
}

#[tokio::test]
async fn second_scan_blocks_as_used_in_single_mode() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    backend.insert_ticket(issued_ticket(event_id, "TKT-1", "Alice"));

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();

    let first = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    assert!(matches!(
        first,
        ScanResponse::Completed(ref r) if r.outcome == ScanOutcome::Valid
    ));

    let_debounce_clear().await;

    let second = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::Completed(result) = second else {
        panic!("expected completed result");
    };
    assert_eq!(result.outcome, ScanOutcome::Used);
    assert_eq!(result.block, Some(BlockReason::AlreadyUsed));
}

#[tokio::test]
async fn reentry_mode_allows_rescan() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    backend.insert_ticket(issued_ticket(event_id, "TKT-1", "Alice"));

    let gate = gate_over(&backend, &fast_config());
    let staff = StaffId::new();

    // First scan in single mode
    gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let_debounce_clear().await;

    // Second scan still single: used
    let blocked = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    assert!(matches!(
        blocked,
        ScanResponse::Completed(ref r) if r.outcome == ScanOutcome::Used
    ));
    let_debounce_clear().await;

    // Switch to re-entry: same ticket passes
    gate.set_reentry_mode(ReentryMode::Reentry).await.unwrap();
    let allowed = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::Completed(result) = allowed else {
        panic!("expected completed result");
    };
    assert_eq!(result.outcome, ScanOutcome::Valid);
}

#[tokio::test]
async fn exit_tracking_toggles_inside_state() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    let ticket = issued_ticket(event_id, "TKT-1", "Alice");
    let ticket_id = ticket.id;
    backend.insert_ticket(ticket);

    let mut config = fast_config();
    config.reentry_mode = ReentryMode::ExitTracking;
    let gate = gate_over(&backend, &config);
    let staff = StaffId::new();

    // Entry
    gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    assert!(backend.ticket(ticket_id).inside);
    assert_eq!(gate.capacity_status(event_id).await.unwrap().current, 1);
    let_debounce_clear().await;

    // Exit: toggles out and frees the slot
    let response = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.outcome, ScanOutcome::Valid);
    assert!(!backend.ticket(ticket_id).inside);
    assert_eq!(gate.capacity_status(event_id).await.unwrap().current, 0);
}

#[tokio::test]
async fn rapid_duplicate_is_ignored_without_second_evaluation() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    backend.insert_ticket(issued_ticket(event_id, "TKT-1", "Alice"));

    // Default config: 1s window, 4s cool-down
    let config = gatecheck::Config::with_secret("test-secret");
    let gate = gate_over(&backend, &config);
    let staff = StaffId::new();

    let first = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    assert!(matches!(first, ScanResponse::Completed(_)));

    // Immediate re-trigger of the same physical credential
    let second = gate.process_scan("TKT-1", ScanMethod::Qr, staff).await.unwrap();
    assert_eq!(second, ScanResponse::Ignored);

    // One rule evaluation, one commit, one audit row
    assert_eq!(backend.scan_log_count(), 1);
    assert_eq!(backend.committed().len(), 1);
}

#[tokio::test]
async fn transferred_ticket_blocks_with_transfer_info() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));

    let mut ticket = issued_ticket(event_id, "TKT-1", "Alice");
    ticket.transfer = Some(TransferInfo {
        from_holder: "Alice".to_string(),
        to_holder: "Bob".to_string(),
        transferred_at: chrono::Utc::now(),
    });
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let response = gate
        .process_scan("TKT-1", ScanMethod::Qr, StaffId::new())
        .await
        .unwrap();

    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.block, Some(BlockReason::Transferred));
    assert!(result.transfer.is_some());
    assert!(!backend.ticket(result.ticket.unwrap().id).is_used);
}

#[tokio::test]
async fn unknown_token_reports_not_found() {
    let backend = TestBackend::new();
    let gate = gate_over(&backend, &fast_config());

    let response = gate
        .process_scan("TKT-UNKNOWN", ScanMethod::Manual, StaffId::new())
        .await
        .unwrap();

    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.outcome, ScanOutcome::Invalid);
    assert_eq!(result.block, Some(BlockReason::NotFound));
}

#[tokio::test]
async fn id_check_requirement_is_surfaced_not_blocking() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));

    let mut ticket = issued_ticket(event_id, "TKT-VIP", "Alice");
    ticket.tier = "VIP".to_string();
    ticket.requires_id_check = true;
    backend.insert_ticket(ticket);

    let gate = gate_over(&backend, &fast_config());
    let response = gate
        .process_scan("TKT-VIP", ScanMethod::Qr, StaffId::new())
        .await
        .unwrap();

    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.outcome, ScanOutcome::Valid);
    assert!(result.requires_id_check);
}

#[tokio::test]
async fn signed_payload_resolves_like_plain_token() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    backend.insert_ticket(issued_ticket(event_id, "TKT-1", "Alice"));

    let config = fast_config();
    let verifier = gatecheck::CredentialVerifier::new(&config.signing_secret).unwrap();
    let payload = serde_json::json!({
        "token": "TKT-1",
        "signature": verifier.sign("TKT-1").unwrap(),
        "meta": {}
    })
    .to_string();

    let gate = gate_over(&backend, &config);
    let response = gate
        .process_scan(payload, ScanMethod::Qr, StaffId::new())
        .await
        .unwrap();

    assert!(matches!(
        response,
        ScanResponse::Completed(ref r) if r.outcome == ScanOutcome::Valid
    ));
}

#[tokio::test]
async fn tampered_payload_is_rejected_before_lookup() {
    let backend = TestBackend::new();
    let event_id = EventId::new();
    backend.set_capacity(CapacityStatus::new(event_id, 100, 0));
    backend.insert_ticket(issued_ticket(event_id, "TKT-1", "Alice"));

    let gate = gate_over(&backend, &fast_config());
    let payload = serde_json::json!({
        "token": "TKT-1",
        "signature": "Zm9yZ2VkIHNpZ25hdHVyZQ==",
    })
    .to_string();

    let response = gate
        .process_scan(payload, ScanMethod::Qr, StaffId::new())
        .await
        .unwrap();

    let ScanResponse::Completed(result) = response else {
        panic!("expected completed result");
    };
    assert_eq!(result.block, Some(BlockReason::CredentialInvalid));
    // Never reached the backend
    assert!(backend.committed().is_empty());
}
