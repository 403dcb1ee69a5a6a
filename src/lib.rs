//! feedwatch: signal monitoring control loop and event pipeline
//!
//! Owns a set of long-lived "signal" watches on external content sources,
//! decides when each is due for re-evaluation, fetches fresh items exactly
//! once per due cycle, classifies the newest one, dispatches a downstream
//! action when the verdict is strong enough, and records one immutable
//! event per evaluation as the audit trail.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;
