//! Unit tests for the in-memory store

use chrono::Utc;
use feedwatch::error::StoreError;
use feedwatch::models::{LifecycleState, NewEvent, NewSignal, SignalChanges, Verdict};
use feedwatch::store::{EventStore, MemoryStore, SignalStore};
use std::time::Duration;

fn new_signal(owner: &str, source: &str) -> NewSignal {
    NewSignal {
        owner_id: owner.to_string(),
        source_ref: source.to_string(),
        target_symbol: None,
        interval: Duration::from_secs(1),
        description: None,
    }
}

fn new_event(signal_id: &str, item_ref: &str, verdict: Verdict) -> NewEvent {
    NewEvent {
        signal_id: signal_id.to_string(),
        item_ref: item_ref.to_string(),
        item_excerpt: "some post".to_string(),
        item_author: "someaccount".to_string(),
        verdict,
        confidence: 0.5,
        symbol_detected: None,
    }
}

#[tokio::test]
async fn test_create_signal_defaults() {
    let store = MemoryStore::new();
    let signal = store
        .create_signal(new_signal("owner-1", "@someaccount"))
        .await
        .unwrap();

    assert_eq!(signal.lifecycle_state, LifecycleState::Active);
    assert_eq!(signal.source_ref, "someaccount"); // '@' stripped
    assert!(signal.watermark.is_none());
    assert!(signal.last_evaluated_at.is_none());
}

#[tokio::test]
async fn test_create_signal_rejects_zero_interval() {
    let store = MemoryStore::new();
    let mut new = new_signal("owner-1", "someaccount");
    new.interval = Duration::ZERO;
    let err = store.create_signal(new).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidSignal(_)));
}

#[tokio::test]
async fn test_list_signals_filters_by_owner_and_state() {
    let store = MemoryStore::new();
    let a = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();
    store
        .create_signal(new_signal("owner-1", "beta"))
        .await
        .unwrap();
    store
        .create_signal(new_signal("owner-2", "gamma"))
        .await
        .unwrap();
    store
        .transition_signal(&a.id, LifecycleState::Paused)
        .await
        .unwrap();

    let all = store.list_signals("owner-1", None, 50).await.unwrap();
    assert_eq!(all.len(), 2);

    let paused = store
        .list_signals("owner-1", Some(LifecycleState::Paused), 50)
        .await
        .unwrap();
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].source_ref, "alpha");
}

#[tokio::test]
async fn test_list_active_excludes_paused_and_stopped() {
    let store = MemoryStore::new();
    let a = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();
    let b = store
        .create_signal(new_signal("owner-1", "beta"))
        .await
        .unwrap();
    store
        .create_signal(new_signal("owner-2", "gamma"))
        .await
        .unwrap();

    store
        .transition_signal(&a.id, LifecycleState::Paused)
        .await
        .unwrap();
    store
        .transition_signal(&b.id, LifecycleState::Stopped)
        .await
        .unwrap();

    let active = store.list_active_signals().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].source_ref, "gamma");
}

#[tokio::test]
async fn test_update_signal_changes_interval_and_description() {
    let store = MemoryStore::new();
    let signal = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();

    let updated = store
        .update_signal(
            &signal.id,
            SignalChanges {
                interval: Some(Duration::from_secs(5)),
                description: Some("watching closely".to_string()),
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.interval, Duration::from_secs(5));
    assert_eq!(updated.description.as_deref(), Some("watching closely"));
    assert!(updated.updated_at >= signal.updated_at);
}

#[tokio::test]
async fn test_transition_stopped_is_terminal() {
    let store = MemoryStore::new();
    let signal = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();
    store
        .transition_signal(&signal.id, LifecycleState::Stopped)
        .await
        .unwrap();

    let err = store
        .transition_signal(&signal.id, LifecycleState::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    // Still stopped, still retained for audit
    let current = store.get_signal(&signal.id).await.unwrap().unwrap();
    assert_eq!(current.lifecycle_state, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_mark_evaluated_preserves_watermark_on_none() {
    let store = MemoryStore::new();
    let signal = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();

    store
        .mark_evaluated(&signal.id, Some("t5"), Utc::now())
        .await
        .unwrap();
    store
        .mark_evaluated(&signal.id, None, Utc::now())
        .await
        .unwrap();

    let current = store.get_signal(&signal.id).await.unwrap().unwrap();
    assert_eq!(current.watermark.as_deref(), Some("t5"));
    assert!(current.last_evaluated_at.is_some());
}

#[tokio::test]
async fn test_mark_evaluated_ignores_stale_watermark() {
    let store = MemoryStore::new();
    let signal = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();

    store
        .mark_evaluated(&signal.id, Some("1000"), Utc::now())
        .await
        .unwrap();
    // Older id, same length
    store
        .mark_evaluated(&signal.id, Some("0999"), Utc::now())
        .await
        .unwrap();
    let current = store.get_signal(&signal.id).await.unwrap().unwrap();
    assert_eq!(current.watermark.as_deref(), Some("1000"));

    // Shorter id is older regardless of lexicographic order
    store
        .mark_evaluated(&signal.id, Some("999"), Utc::now())
        .await
        .unwrap();
    let current = store.get_signal(&signal.id).await.unwrap().unwrap();
    assert_eq!(current.watermark.as_deref(), Some("1000"));

    // Longer id is newer
    store
        .mark_evaluated(&signal.id, Some("10001"), Utc::now())
        .await
        .unwrap();
    let current = store.get_signal(&signal.id).await.unwrap().unwrap();
    assert_eq!(current.watermark.as_deref(), Some("10001"));
}

#[tokio::test]
async fn test_delete_signal_cascades_events() {
    let store = MemoryStore::new();
    let signal = store
        .create_signal(new_signal("owner-1", "alpha"))
        .await
        .unwrap();
    store
        .append_event(new_event(&signal.id, "t1", Verdict::Neutral))
        .await
        .unwrap();

    assert!(store.delete_signal(&signal.id).await.unwrap());
    let events = store.events_for_signal(&signal.id, None, 50).await.unwrap();
    assert!(events.is_empty());
    assert!(!store.delete_signal(&signal.id).await.unwrap());
}

#[tokio::test]
async fn test_append_event_starts_with_no_actions() {
    let store = MemoryStore::new();
    let event = store
        .append_event(new_event("sig-1", "t1", Verdict::Positive))
        .await
        .unwrap();
    assert!(event.actions_taken.is_empty());
    assert!(event.action_result.is_none());
}

#[tokio::test]
async fn test_record_actions_updates_event_once() {
    let store = MemoryStore::new();
    let event = store
        .append_event(new_event("sig-1", "t1", Verdict::Positive))
        .await
        .unwrap();

    store
        .record_actions(
            &event.id,
            &["action_dispatched".to_string()],
            Some(serde_json::json!({ "metrics": { "total_return": 12.5 } })),
        )
        .await
        .unwrap();

    let events = store.events_for_signal("sig-1", None, 50).await.unwrap();
    assert_eq!(events[0].actions_taken, vec!["action_dispatched"]);
    assert!(events[0].action_result.is_some());
}

#[tokio::test]
async fn test_events_for_signal_filters_by_verdict() {
    let store = MemoryStore::new();
    store
        .append_event(new_event("sig-1", "t1", Verdict::Positive))
        .await
        .unwrap();
    store
        .append_event(new_event("sig-1", "t2", Verdict::Neutral))
        .await
        .unwrap();
    store
        .append_event(new_event("sig-2", "t3", Verdict::Positive))
        .await
        .unwrap();

    let positive = store
        .events_for_signal("sig-1", Some(Verdict::Positive), 50)
        .await
        .unwrap();
    assert_eq!(positive.len(), 1);
    assert_eq!(positive[0].item_ref, "t1");

    let all = store.events_for_signal("sig-1", None, 50).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_recent_events_spans_signals() {
    let store = MemoryStore::new();
    store
        .append_event(new_event("sig-1", "t1", Verdict::Positive))
        .await
        .unwrap();
    store
        .append_event(new_event("sig-2", "t2", Verdict::Negative))
        .await
        .unwrap();
    store
        .append_event(new_event("sig-3", "t3", Verdict::Neutral))
        .await
        .unwrap();

    let events = store
        .recent_events(&["sig-1".to_string(), "sig-2".to_string()], 50)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.signal_id != "sig-3"));
}
