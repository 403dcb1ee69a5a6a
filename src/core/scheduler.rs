//! Tick-driven control loop that dispatches due signals to the pipeline

use crate::core::pipeline::{RunOutcome, SignalPipeline};
use crate::metrics::Metrics;
use crate::store::SignalStore;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed tick period of the control loop; coarser than any individual
    /// signal interval in practice, so per-signal intervals act as a
    /// minimum gap rather than a guaranteed cadence
    pub tick_interval: Duration,
    /// Upper bound on concurrently running pipeline evaluations
    pub max_concurrent_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            max_concurrent_runs: 8,
        }
    }
}

/// Holds a signal's exclusion slot for the duration of one run and
/// releases it on drop, so a panicking task can never leave its signal
/// permanently claimed.
struct InFlightSlot {
    signal_id: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.signal_id);
    }
}

/// Control loop over active signals.
///
/// Each tick queries the store for active signals, filters to those whose
/// interval has elapsed, and spawns one pipeline run per due signal. Runs
/// are bounded by a semaphore, and an in-flight set guarantees no two runs
/// for the same signal ever overlap: a signal still running when the next
/// tick fires is skipped, not queued.
pub struct SignalScheduler {
    pipeline: Arc<SignalPipeline>,
    signals: Arc<dyn SignalStore>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    shutdown: watch::Sender<bool>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
    metrics: Option<Arc<Metrics>>,
}

impl SignalScheduler {
    pub fn new(
        pipeline: Arc<SignalPipeline>,
        signals: Arc<dyn SignalStore>,
        config: SchedulerConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs));
        Self {
            pipeline,
            signals,
            config,
            permits,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
            handle: Arc::new(RwLock::new(None)),
            metrics,
        }
    }

    /// Start the tick loop. Idempotent: calling while running is a no-op.
    pub async fn start(&self) {
        let mut handle = self.handle.write().await;
        if handle.is_some() {
            info!("SignalScheduler: already running");
            return;
        }

        let _ = self.shutdown.send(false);
        let mut shutdown_rx = self.shutdown.subscribe();
        let pipeline = self.pipeline.clone();
        let signals = self.signals.clone();
        let permits = self.permits.clone();
        let in_flight = self.in_flight.clone();
        let metrics = self.metrics.clone();
        let tick_interval = self.config.tick_interval;

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                tick_secs = tick_interval.as_secs(),
                "SignalScheduler: started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::run_tick(&pipeline, &signals, &permits, &in_flight, &metrics).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("SignalScheduler: tick loop exited");
        }));

        info!("SignalScheduler: started successfully");
    }

    /// Request cooperative shutdown and wait for in-flight runs to finish.
    /// Idempotent: calling while stopped is a no-op. Running evaluations
    /// are never aborted; partially applied side effects are worse than
    /// one extra stale evaluation.
    pub async fn stop(&self) {
        let handle = { self.handle.write().await.take() };
        let Some(handle) = handle else {
            return;
        };

        let _ = self.shutdown.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "SignalScheduler: tick loop join failed");
        }

        // Drain: every spawned run frees its slot when its task ends
        loop {
            let drained = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty();
            if drained {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        info!("SignalScheduler: stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }

    async fn run_tick(
        pipeline: &Arc<SignalPipeline>,
        signals: &Arc<dyn SignalStore>,
        permits: &Arc<Semaphore>,
        in_flight: &Arc<Mutex<HashSet<String>>>,
        metrics: &Option<Arc<Metrics>>,
    ) {
        let now = Utc::now();
        let active = match signals.list_active_signals().await {
            Ok(list) => list,
            Err(e) => {
                // The loop itself never dies on a store hiccup
                error!(error = %e, "SignalScheduler: failed to list active signals");
                return;
            }
        };

        let due: Vec<_> = active.into_iter().filter(|s| s.is_due(now)).collect();
        if due.is_empty() {
            debug!("SignalScheduler: tick, nothing due");
            return;
        }
        info!(
            due = due.len(),
            "SignalScheduler: tick, dispatching {} due signals",
            due.len()
        );

        for signal in due {
            let signal_id = signal.id.clone();

            // Per-signal exclusion: skip if a prior run is still in flight
            let claimed = in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(signal_id.clone());
            if !claimed {
                debug!(
                    signal_id = %signal_id,
                    "SignalScheduler: previous run still in flight, skipping"
                );
                continue;
            }
            let slot = InFlightSlot {
                signal_id: signal_id.clone(),
                set: in_flight.clone(),
            };

            let pipeline = pipeline.clone();
            let permits = permits.clone();
            let metrics = metrics.clone();

            tokio::spawn(async move {
                // Released on drop, panic included
                let _slot = slot;

                // Acquire the concurrency permit inside the task so the
                // tick loop never blocks on a saturated pool
                let Ok(permit) = permits.acquire_owned().await else {
                    return;
                };

                if let Some(ref m) = metrics {
                    m.signal_evaluations_active.inc();
                }
                let start = Instant::now();

                match pipeline.run(&signal_id).await {
                    Ok(RunOutcome::Evaluated {
                        ref event_id,
                        dispatched,
                    }) => {
                        info!(
                            signal_id = %signal_id,
                            event_id = %event_id,
                            dispatched = dispatched,
                            "SignalScheduler: evaluation recorded"
                        );
                    }
                    Ok(RunOutcome::NoNewItems) => {
                        debug!(signal_id = %signal_id, "SignalScheduler: nothing new");
                    }
                    Ok(RunOutcome::NotDue) => {
                        debug!(signal_id = %signal_id, "SignalScheduler: run was a no-op");
                    }
                    Err(e) => {
                        // Per-signal failures stop here, never the loop
                        error!(
                            signal_id = %signal_id,
                            error = %e,
                            "SignalScheduler: pipeline run failed"
                        );
                    }
                }

                if let Some(ref m) = metrics {
                    m.signal_evaluation_duration_seconds
                        .observe(start.elapsed().as_secs_f64());
                    m.signal_evaluations_total.inc();
                    m.signal_evaluations_active.dec();
                }

                drop(permit);
            });
        }
    }
}
