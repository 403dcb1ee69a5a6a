//! Signal entity and lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a signal
///
/// Active signals are picked up by the scheduler each tick. Paused signals
/// are skipped but can be resumed. Stopped is terminal: a stopped signal is
/// retained for audit and never re-evaluated; create a new signal to resume
/// monitoring the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Paused,
    Stopped,
}

impl LifecycleState {
    /// Valid edges: Active <-> Paused, Active -> Stopped, Paused -> Stopped.
    /// No transition leaves Stopped.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Active, Paused) | (Active, Stopped) | (Paused, Active) | (Paused, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Active => "active",
            LifecycleState::Paused => "paused",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A standing watch on an external content source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub owner_id: String,
    /// External account/feed to watch (stored without a leading '@')
    pub source_ref: String,
    /// Optional symbol hint passed to the classifier and dispatcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_symbol: Option<String>,
    /// Minimum gap between re-evaluations. The scheduler tick period
    /// dominates when it is coarser, so this is a floor, not a cadence.
    pub interval: Duration,
    pub lifecycle_state: LifecycleState,
    /// Newest source item already evaluated; None until the first
    /// successful fetch. Only ever advances, and only after the cycle's
    /// event has been durably recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signal {
    /// A signal is due when it has never been evaluated or its interval
    /// has elapsed since the last completed evaluation.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_evaluated_at {
            None => true,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                elapsed >= self.interval
            }
        }
    }
}

/// Payload for creating a signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignal {
    pub owner_id: String,
    pub source_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_symbol: Option<String>,
    pub interval: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Updatable signal fields; lifecycle changes go through
/// `SignalStore::transition_signal` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
