//! Unit tests for the signal lifecycle state machine and due check

use chrono::{Duration as ChronoDuration, Utc};
use feedwatch::models::{LifecycleState, Signal};
use std::time::Duration;

fn signal_with_last_evaluated(last: Option<chrono::DateTime<Utc>>, interval: Duration) -> Signal {
    let now = Utc::now();
    Signal {
        id: "sig-1".to_string(),
        owner_id: "owner-1".to_string(),
        source_ref: "someaccount".to_string(),
        target_symbol: None,
        interval,
        lifecycle_state: LifecycleState::Active,
        watermark: None,
        last_evaluated_at: last,
        description: None,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn test_never_evaluated_is_due() {
    let signal = signal_with_last_evaluated(None, Duration::from_secs(60));
    assert!(signal.is_due(Utc::now()));
}

#[test]
fn test_recently_evaluated_is_not_due() {
    let now = Utc::now();
    let signal = signal_with_last_evaluated(
        Some(now - ChronoDuration::seconds(10)),
        Duration::from_secs(60),
    );
    assert!(!signal.is_due(now));
}

#[test]
fn test_elapsed_interval_is_due() {
    let now = Utc::now();
    let signal = signal_with_last_evaluated(
        Some(now - ChronoDuration::seconds(61)),
        Duration::from_secs(60),
    );
    assert!(signal.is_due(now));
}

#[test]
fn test_due_exactly_at_interval_boundary() {
    let now = Utc::now();
    let signal = signal_with_last_evaluated(
        Some(now - ChronoDuration::seconds(60)),
        Duration::from_secs(60),
    );
    assert!(signal.is_due(now));
}

#[test]
fn test_active_can_pause_and_stop() {
    assert!(LifecycleState::Active.can_transition_to(LifecycleState::Paused));
    assert!(LifecycleState::Active.can_transition_to(LifecycleState::Stopped));
}

#[test]
fn test_paused_can_resume_and_stop() {
    assert!(LifecycleState::Paused.can_transition_to(LifecycleState::Active));
    assert!(LifecycleState::Paused.can_transition_to(LifecycleState::Stopped));
}

#[test]
fn test_stopped_is_terminal() {
    assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Active));
    assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Paused));
    assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Stopped));
}

#[test]
fn test_self_transitions_rejected() {
    assert!(!LifecycleState::Active.can_transition_to(LifecycleState::Active));
    assert!(!LifecycleState::Paused.can_transition_to(LifecycleState::Paused));
}

#[test]
fn test_state_serializes_lowercase() {
    let json = serde_json::to_string(&LifecycleState::Active).unwrap();
    assert_eq!(json, "\"active\"");
    let json = serde_json::to_string(&LifecycleState::Stopped).unwrap();
    assert_eq!(json, "\"stopped\"");
}
