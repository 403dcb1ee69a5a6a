//! Prometheus metrics for pipeline evaluations and store health

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry};

pub struct Metrics {
    pub registry: Registry,
    /// Completed pipeline evaluations (any outcome)
    pub signal_evaluations_total: Counter,
    /// Evaluations currently in flight
    pub signal_evaluations_active: Gauge,
    /// Wall-clock duration of one pipeline run
    pub signal_evaluation_duration_seconds: Histogram,
    /// Events durably appended
    pub events_recorded_total: Counter,
    /// Action dispatch attempts that failed
    pub dispatch_failures_total: Counter,
    /// 1.0 when the document store is connected
    pub database_connected: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let signal_evaluations_total = Counter::with_opts(Opts::new(
            "signal_evaluations_total",
            "Total completed signal pipeline evaluations",
        ))?;
        let signal_evaluations_active = Gauge::with_opts(Opts::new(
            "signal_evaluations_active",
            "Signal pipeline evaluations currently in flight",
        ))?;
        let signal_evaluation_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "signal_evaluation_duration_seconds",
            "Duration of one signal pipeline evaluation",
        ))?;
        let events_recorded_total = Counter::with_opts(Opts::new(
            "events_recorded_total",
            "Total signal events appended to the event store",
        ))?;
        let dispatch_failures_total = Counter::with_opts(Opts::new(
            "dispatch_failures_total",
            "Total failed action dispatch attempts",
        ))?;
        let database_connected = Gauge::with_opts(Opts::new(
            "database_connected",
            "Whether the document store connection is up (1.0) or down (0.0)",
        ))?;

        registry.register(Box::new(signal_evaluations_total.clone()))?;
        registry.register(Box::new(signal_evaluations_active.clone()))?;
        registry.register(Box::new(signal_evaluation_duration_seconds.clone()))?;
        registry.register(Box::new(events_recorded_total.clone()))?;
        registry.register(Box::new(dispatch_failures_total.clone()))?;
        registry.register(Box::new(database_connected.clone()))?;

        Ok(Self {
            registry,
            signal_evaluations_total,
            signal_evaluations_active,
            signal_evaluation_duration_seconds,
            events_recorded_total,
            dispatch_failures_total,
            database_connected,
        })
    }
}
