//! Immutable evaluation outcome records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Action tag recorded when the dispatcher completed successfully
pub const ACTION_DISPATCHED: &str = "action_dispatched";
/// Action tag recorded when the dispatcher was attempted and failed
pub const ACTION_DISPATCH_FAILED: &str = "dispatch_failed";
/// Action tag recorded when the notification sink accepted the message
pub const ACTION_NOTIFICATION_SENT: &str = "notification_sent";

/// Categorical judgment from the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Positive,
    Negative,
    Neutral,
}

impl Verdict {
    /// Positive and Negative verdicts can cross the action threshold;
    /// Neutral never does.
    pub fn is_directional(self) -> bool {
        matches!(self, Verdict::Positive | Verdict::Negative)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Positive => "positive",
            Verdict::Negative => "negative",
            Verdict::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// One immutable record of a classification outcome for a signal.
///
/// Events are append-only except for a single in-place update of
/// `actions_taken`/`action_result` immediately after the action step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub id: String,
    pub signal_id: String,
    /// Identifier of the external item evaluated (e.g. a post id)
    pub item_ref: String,
    /// Text snapshot of the item, for audit and display
    pub item_excerpt: String,
    pub item_author: String,
    pub verdict: Verdict,
    /// In [0, 1]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_detected: Option<String>,
    /// Side-effect tags, empty when the verdict did not cross the
    /// action threshold
    pub actions_taken: Vec<String>,
    /// Opaque dispatcher payload, stored for audit/display only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_result: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Payload for appending an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub signal_id: String,
    pub item_ref: String,
    pub item_excerpt: String,
    pub item_author: String,
    pub verdict: Verdict,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_detected: Option<String>,
}
