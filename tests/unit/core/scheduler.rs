//! Tests for the tick-driven scheduler: lifecycle gating, interval
//! gating, per-signal exclusion, fault isolation, graceful shutdown

use crate::support::{classification, item, FetchPlan, TestHarness};
use feedwatch::core::scheduler::{SchedulerConfig, SignalScheduler};
use feedwatch::models::{LifecycleState, Verdict};
use feedwatch::store::SignalStore;
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(20);

fn scheduler(h: &TestHarness) -> SignalScheduler {
    SignalScheduler::new(
        h.pipeline.clone(),
        h.store.clone(),
        SchedulerConfig {
            tick_interval: TICK,
            max_concurrent_runs: 4,
        },
        None,
    )
}

async fn run_for(scheduler: &SignalScheduler, duration: Duration) {
    scheduler.start().await;
    tokio::time::sleep(duration).await;
    scheduler.stop().await;
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let h = TestHarness::new();
    let s = scheduler(&h);

    assert!(!s.is_running().await);
    s.start().await;
    assert!(s.is_running().await);
    s.start().await;
    assert!(s.is_running().await);

    s.stop().await;
    assert!(!s.is_running().await);
    s.stop().await;
    assert!(!s.is_running().await);
}

#[tokio::test]
async fn only_active_signals_are_evaluated() {
    let h = TestHarness::new();
    let active = h
        .create_signal("activeacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    let paused = h
        .create_signal("pausedacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    let stopped = h
        .create_signal("stoppedacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    h.store
        .transition_signal(&paused.id, LifecycleState::Paused)
        .await
        .unwrap();
    h.store
        .transition_signal(&stopped.id, LifecycleState::Stopped)
        .await
        .unwrap();

    let s = scheduler(&h);
    run_for(&s, TICK * 5).await;

    assert!(h.fetcher.calls_for(&active.source_ref).await >= 1);
    assert_eq!(h.fetcher.calls_for(&paused.source_ref).await, 0);
    assert_eq!(h.fetcher.calls_for(&stopped.source_ref).await, 0);
}

#[tokio::test]
async fn interval_gates_repeat_evaluations() {
    let h = TestHarness::new();
    // Interval far longer than the test window: exactly one evaluation
    let signal = h
        .create_signal("slowacct", Some("TSLA"), Duration::from_secs(3600))
        .await;

    let s = scheduler(&h);
    run_for(&s, TICK * 8).await;

    assert_eq!(h.fetcher.calls_for(&signal.source_ref).await, 1);
}

#[tokio::test]
async fn tiny_interval_is_evaluated_on_successive_ticks() {
    let h = TestHarness::new();
    let signal = h
        .create_signal("fastacct", Some("TSLA"), Duration::from_millis(1))
        .await;

    let s = scheduler(&h);
    run_for(&s, TICK * 8).await;

    assert!(h.fetcher.calls_for(&signal.source_ref).await >= 2);
}

#[tokio::test]
async fn overlapping_runs_for_one_signal_are_skipped() {
    let h = TestHarness::new();
    let signal = h
        .create_signal("blockedacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    // One fetch outlasts the whole window, so every later tick finds the
    // signal still in flight
    h.fetcher.set_delay(TICK * 20).await;

    let s = scheduler(&h);
    s.start().await;
    tokio::time::sleep(TICK * 8).await;
    let during = h.fetcher.calls_for(&signal.source_ref).await;
    s.stop().await;

    assert_eq!(during, 1);
}

#[tokio::test]
async fn a_failing_signal_does_not_stop_the_others() {
    let h = TestHarness::new();
    let broken = h
        .create_signal("brokenacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    let healthy = h
        .create_signal("healthyacct", Some("AAPL"), Duration::from_millis(1))
        .await;

    h.fetcher
        .set_source_plan(&broken.source_ref, FetchPlan::Fail("upstream down".into()))
        .await;
    h.fetcher
        .set_source_plan(
            &healthy.source_ref,
            FetchPlan::Items(vec![item("t1", "AAPL to the moon")]),
        )
        .await;
    h.classifier
        .push(Ok(classification(Verdict::Positive, 0.9, Some("AAPL"))))
        .await;

    let s = scheduler(&h);
    run_for(&s, TICK * 6).await;

    // The broken signal kept the loop alive for the healthy one
    assert!(h.fetcher.calls_for(&broken.source_ref).await >= 1);
    assert!(h.fetcher.calls_for(&healthy.source_ref).await >= 1);
    assert!(!h.events(&healthy.id).await.is_empty());
    assert!(h.events(&broken.id).await.is_empty());
}

#[tokio::test]
async fn stop_waits_for_in_flight_runs() {
    let h = TestHarness::new();
    let signal = h
        .create_signal("drainacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    h.fetcher
        .set_source_plan(
            &signal.source_ref,
            FetchPlan::Items(vec![item("t1", "TSLA breakout")]),
        )
        .await;
    h.fetcher.set_delay(TICK * 4).await;

    let s = scheduler(&h);
    s.start().await;
    // Long enough for the first tick to spawn a run, short enough that
    // the slow fetch is still in flight when we ask to stop
    tokio::time::sleep(TICK * 2).await;
    s.stop().await;

    // The in-flight evaluation ran to completion before stop returned
    assert!(!h.events(&signal.id).await.is_empty());
    let stored = h.store.get_signal(&signal.id).await.unwrap().unwrap();
    assert_eq!(stored.watermark.as_deref(), Some("t1"));
}

#[tokio::test]
async fn panicked_run_frees_its_slot_and_stop_still_drains() {
    let h = TestHarness::new();
    let signal = h
        .create_signal("crashacct", Some("TSLA"), Duration::from_millis(1))
        .await;
    // First run dies mid-fetch; later runs succeed
    h.fetcher.push(FetchPlan::Panic).await;

    let s = scheduler(&h);
    s.start().await;
    tokio::time::sleep(TICK * 6).await;
    // Would hang here if the dead run never released its exclusion slot
    s.stop().await;

    assert!(h.fetcher.calls_for(&signal.source_ref).await >= 2);
}

#[tokio::test]
async fn scheduler_survives_an_empty_store() {
    let h = TestHarness::new();
    let s = Arc::new(scheduler(&h));
    run_for(&s, TICK * 4).await;
    assert_eq!(h.fetcher.call_count().await, 0);
}
