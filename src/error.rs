//! Error taxonomy for the monitoring pipeline
//!
//! Each collaborator boundary gets its own error type so the pipeline can
//! apply a different recovery policy per step: fetch errors retry on the
//! next tick, classify errors degrade to a neutral verdict, dispatch errors
//! are recorded on the event, and store errors abort the cycle.

use thiserror::Error;

/// Source fetch failed. The cycle aborts without touching signal state;
/// the next tick retries naturally.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source request failed: {0}")]
    Request(String),
    #[error("source account not found: {0}")]
    SourceNotFound(String),
    #[error("malformed source response: {0}")]
    Malformed(String),
}

/// Classification failed. The pipeline degrades to Neutral/0.0 and
/// continues so a classifier outage cannot block watermark advancement.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier request failed: {0}")]
    Request(String),
}

/// Action dispatch failed. Recorded on the event as a failure marker,
/// never retried automatically, never aborts the cycle.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher request failed: {0}")]
    Request(String),
    #[error("dispatch rejected: {0}")]
    Rejected(String),
}

/// Notification delivery failed. Fire-and-forget; logged only.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Storage failure on SignalStore/EventStore.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
}

/// A pipeline run failed before it could safely advance the signal.
///
/// Only fetch and store failures surface here; classify, dispatch and
/// notify failures are absorbed inside the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
