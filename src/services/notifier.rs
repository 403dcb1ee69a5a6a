//! Notification sink boundary: fire-and-forget signal alerts

use crate::error::NotifyError;
use crate::models::Verdict;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Append-only delivery of a signal message to a conversation/log
/// collaborator. Failures are non-fatal and logged by the caller.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, signal_id: &str, message: &str) -> Result<(), NotifyError>;
}

/// Posts an assistant message into the owner's conversation
pub struct ConversationNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl ConversationNotifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for ConversationNotifier {
    async fn notify(&self, signal_id: &str, message: &str) -> Result<(), NotifyError> {
        let url = format!("{}/signals/{}/messages", self.base_url, signal_id);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "role": "assistant", "content": message }))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!(
                "conversation service returned {}",
                status
            )));
        }
        Ok(())
    }
}

/// Log-only sink used when no conversation endpoint is configured
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, signal_id: &str, message: &str) -> Result<(), NotifyError> {
        info!(signal_id = %signal_id, message = %message, "signal notification");
        Ok(())
    }
}

/// Render the notification message for a detected signal
pub fn format_signal_message(
    source_ref: &str,
    verdict: Verdict,
    confidence: f64,
    symbol: Option<&str>,
    item_excerpt: &str,
    rationale: &str,
    action_result: Option<&Value>,
) -> String {
    let mut message = format!(
        "**Signal detected from @{}**\n\n\
         **Verdict**: {} (confidence: {:.0}%)\n\
         **Symbol**: {}\n\n\
         **Post**: \"{}\"\n\n\
         **Analysis**: {}",
        source_ref,
        verdict,
        confidence * 100.0,
        symbol.unwrap_or("TBD"),
        item_excerpt,
        rationale,
    );

    if let Some(metrics) = action_result.and_then(|r| r.get("metrics")) {
        message.push_str(&format!("\n\n**Backtest metrics**: {}", metrics));
    }
    message
}
