//! Action dispatcher boundary: the downstream effect for actionable verdicts

use crate::error::DispatchError;
use crate::models::Verdict;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Result of one dispatch attempt, stored on the event for audit.
/// An `Ok` outcome with `success: false` is recorded as a failed
/// dispatch, same as an `Err`.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub result: Option<Value>,
}

/// Performs the downstream side effect for an actionable verdict.
///
/// From the pipeline's perspective this is one opaque, possibly slow,
/// possibly failing call: one attempt per pipeline run, no internal retry.
#[async_trait::async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, symbol: &str, verdict: Verdict)
        -> Result<DispatchOutcome, DispatchError>;
}

/// Drives a backtest service through its three-step sequence: fetch
/// reference data, synthesize a strategy script, execute it.
pub struct BacktestDispatcher {
    client: reqwest::Client,
    base_url: String,
}

impl BacktestDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    async fn post_step(&self, path: &str, body: &Value) -> Result<Value, DispatchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| DispatchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(format!(
                "{} returned {}",
                path, status
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DispatchError::Request(e.to_string()))?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(DispatchError::Rejected(format!("{}: {}", path, reason)));
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl ActionDispatcher for BacktestDispatcher {
    async fn dispatch(
        &self,
        symbol: &str,
        verdict: Verdict,
    ) -> Result<DispatchOutcome, DispatchError> {
        let end_date = Utc::now().date_naive();
        let start_date = end_date - ChronoDuration::days(365);
        let strategy = format!(
            "Moving average crossover strategy based on a {} signal",
            verdict
        );

        info!(symbol = %symbol, verdict = %verdict, "triggering backtest dispatch");

        let data = self
            .post_step(
                "/data/fetch",
                &json!({
                    "symbol": symbol,
                    "start_date": start_date.to_string(),
                    "end_date": end_date.to_string(),
                }),
            )
            .await?;
        let data_ref = data.get("file_path").cloned().unwrap_or(Value::Null);
        debug!(symbol = %symbol, "backtest data fetched");

        let script = self
            .post_step(
                "/scripts/generate",
                &json!({
                    "symbol": symbol,
                    "strategy": strategy,
                    "data_ref": data_ref,
                }),
            )
            .await?;
        let script_ref = script.get("script_path").cloned().unwrap_or(Value::Null);
        debug!(symbol = %symbol, "backtest script generated");

        let execution = self
            .post_step("/backtests/execute", &json!({ "script_ref": script_ref }))
            .await?;

        let metrics = execution.get("metrics").cloned().unwrap_or(Value::Null);
        info!(symbol = %symbol, "backtest dispatch complete");

        Ok(DispatchOutcome {
            success: true,
            result: Some(json!({
                "symbol": symbol,
                "strategy": strategy,
                "date_range": format!("{} to {}", start_date, end_date),
                "metrics": metrics,
            })),
        })
    }
}
