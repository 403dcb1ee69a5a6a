//! Durable storage for signals and their evaluation events
//!
//! Two backends: an in-memory store (tests, no-database sandbox runs) and a
//! Postgres-backed document store. Every mutation is a single atomic update
//! keyed by signal id (or event id); no multi-row transactions are needed
//! because each pipeline run only touches its own signal row and appends
//! its own events.

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::models::{
    LifecycleState, NewEvent, NewSignal, Signal, SignalChanges, SignalEvent, Verdict,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Whether `candidate` is a newer cursor than `current`. Source item ids
/// are decimal strings that only grow in magnitude, so a longer id is
/// always newer and equal-length ids compare lexicographically.
pub(crate) fn watermark_advances(candidate: &str, current: &str) -> bool {
    match candidate.len().cmp(&current.len()) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate > current,
    }
}

/// CRUD and lifecycle queries over signal resources
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create_signal(&self, new: NewSignal) -> Result<Signal, StoreError>;

    async fn get_signal(&self, id: &str) -> Result<Option<Signal>, StoreError>;

    /// Signals for one owner, newest first, optionally filtered by state
    async fn list_signals(
        &self,
        owner_id: &str,
        state: Option<LifecycleState>,
        limit: usize,
    ) -> Result<Vec<Signal>, StoreError>;

    /// All active signals across owners; the scheduler's per-tick query
    async fn list_active_signals(&self) -> Result<Vec<Signal>, StoreError>;

    /// Update interval/description; bumps `updated_at`
    async fn update_signal(
        &self,
        id: &str,
        changes: SignalChanges,
    ) -> Result<Option<Signal>, StoreError>;

    /// Apply a lifecycle transition, validating the state machine.
    /// Returns `StoreError::InvalidTransition` on a forbidden edge.
    async fn transition_signal(
        &self,
        id: &str,
        to: LifecycleState,
    ) -> Result<Option<Signal>, StoreError>;

    /// Record a completed evaluation: set `last_evaluated_at`, and advance
    /// the watermark when `watermark` is `Some`. The watermark never moves
    /// backwards: a stale or older cursor is ignored, and a `None` leaves
    /// the cursor untouched (empty fetch).
    async fn mark_evaluated(
        &self,
        id: &str,
        watermark: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Administrative hard delete; cascade-deletes the signal's events.
    /// Never called by the scheduler.
    async fn delete_signal(&self, id: &str) -> Result<bool, StoreError>;
}

/// Append-only log of evaluation outcomes per signal
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_event(&self, new: NewEvent) -> Result<SignalEvent, StoreError>;

    /// The single post-action update: set `actions_taken` and
    /// `action_result` on an existing event. Best-effort, called once.
    async fn record_actions(
        &self,
        event_id: &str,
        actions: &[String],
        action_result: Option<Value>,
    ) -> Result<(), StoreError>;

    /// Events for one signal, newest first, optionally filtered by verdict
    async fn events_for_signal(
        &self,
        signal_id: &str,
        verdict: Option<Verdict>,
        limit: usize,
    ) -> Result<Vec<SignalEvent>, StoreError>;

    /// Recent events across a set of signals (an owner's feed), newest
    /// first. The caller supplies the owner's signal ids.
    async fn recent_events(
        &self,
        signal_ids: &[String],
        limit: usize,
    ) -> Result<Vec<SignalEvent>, StoreError>;
}
