//! Tests for #[derive(Action)] macro

use chrono::{DateTime, Utc};
use turnstile_macros::Action;

#[derive(Action, Clone, Debug, PartialEq)]
enum LaneAction {
    #[command]
    AdmitGuest {
        token: String,
    },

    #[command]
    CloseLane,

    #[event]
    GuestAdmitted {
        token: String,
        admitted_at: DateTime<Utc>,
    },

    #[event]
    LaneClosed {
        closed_at: DateTime<Utc>,
    },

    // Unmarked variants are neither commands nor events
    Tick,
}

#[test]
fn commands_report_as_commands() {
    let action = LaneAction::AdmitGuest {
        token: "TKT-1".to_string(),
    };
    assert!(action.is_command());
    assert!(!action.is_event());

    assert!(LaneAction::CloseLane.is_command());
}

#[test]
fn events_report_as_events() {
    let action = LaneAction::GuestAdmitted {
        token: "TKT-1".to_string(),
        admitted_at: Utc::now(),
    };
    assert!(!action.is_command());
    assert!(action.is_event());
}

#[test]
fn event_type_names_are_versioned() {
    let action = LaneAction::LaneClosed {
        closed_at: Utc::now(),
    };
    assert_eq!(action.event_type(), "LaneClosed.v1");
}

#[test]
fn commands_have_no_event_type() {
    assert_eq!(LaneAction::CloseLane.event_type(), "unknown");
}

#[test]
fn unmarked_variants_are_neither() {
    assert!(!LaneAction::Tick.is_command());
    assert!(!LaneAction::Tick.is_event());
}
