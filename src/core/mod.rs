//! Core control loop and per-signal evaluation pipeline

pub mod pipeline;
pub mod scheduler;

pub use pipeline::{PipelineContext, RunOutcome, SignalPipeline};
pub use scheduler::{SchedulerConfig, SignalScheduler};
