//! Per-signal evaluation pipeline
//!
//! One run performs one complete cycle for one due signal:
//! guard -> fetch -> select -> classify -> decide -> record -> act ->
//! notify -> advance. The write ordering is the correctness backbone: the
//! event is durably appended before any externally visible action, and the
//! watermark advances only as the final write, so a crash mid-cycle never
//! loses the audit record and at worst re-evaluates the same item.

use crate::error::PipelineError;
use crate::metrics::Metrics;
use crate::models::event::{
    ACTION_DISPATCHED, ACTION_DISPATCH_FAILED, ACTION_NOTIFICATION_SENT,
};
use crate::models::{LifecycleState, NewEvent, Signal};
use crate::services::notifier::format_signal_message;
use crate::services::{
    ActionDispatcher, Classification, Classifier, NotificationSink, SourceFetcher,
};
use crate::store::{EventStore, SignalStore};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directional verdicts at or above this confidence trigger the action step
pub const ACTION_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Upper bound on items requested per fetch; only the newest is evaluated
pub const FETCH_MAX_ITEMS: usize = 5;

/// Shared collaborators injected into every pipeline run
pub struct PipelineContext {
    pub signals: Arc<dyn SignalStore>,
    pub events: Arc<dyn EventStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub classifier: Arc<dyn Classifier>,
    pub dispatcher: Arc<dyn ActionDispatcher>,
    pub notifier: Arc<dyn NotificationSink>,
    pub metrics: Option<Arc<Metrics>>,
}

/// Outcome of one completed pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Guard found the signal missing, not active, or not yet due
    NotDue,
    /// Fetch succeeded but nothing new existed; `last_evaluated_at`
    /// advanced, watermark unchanged
    NoNewItems,
    /// A new item was classified and recorded
    Evaluated { event_id: String, dispatched: bool },
}

pub struct SignalPipeline {
    ctx: Arc<PipelineContext>,
}

impl SignalPipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Run one evaluation cycle for the given signal.
    ///
    /// Fetch and store failures abort the run without touching signal
    /// state; classify, dispatch, and notify failures are absorbed so the
    /// cycle still completes and the watermark still advances.
    pub async fn run(&self, signal_id: &str) -> Result<RunOutcome, PipelineError> {
        let now = Utc::now();

        // Guard: re-read fresh state; the signal may have been paused or
        // already evaluated since the tick queued it.
        let Some(signal) = self.ctx.signals.get_signal(signal_id).await? else {
            debug!(signal_id = %signal_id, "signal gone, skipping run");
            return Ok(RunOutcome::NotDue);
        };
        if signal.lifecycle_state != LifecycleState::Active {
            debug!(
                signal_id = %signal.id,
                state = %signal.lifecycle_state,
                "signal no longer active, skipping run"
            );
            return Ok(RunOutcome::NotDue);
        }
        if !signal.is_due(now) {
            debug!(signal_id = %signal.id, "interval not yet elapsed, skipping run");
            return Ok(RunOutcome::NotDue);
        }

        // Fetch: failure leaves state untouched, the next tick retries
        let items = self
            .ctx
            .fetcher
            .fetch_new(&signal.source_ref, signal.watermark.as_deref(), FETCH_MAX_ITEMS)
            .await?;

        // Select: zero new items still counts as an evaluation so the
        // interval gate works, but produces no event
        let Some(newest) = items.last() else {
            debug!(
                signal_id = %signal.id,
                source_ref = %signal.source_ref,
                "no new items"
            );
            self.ctx.signals.mark_evaluated(&signal.id, None, now).await?;
            return Ok(RunOutcome::NoNewItems);
        };

        debug!(
            signal_id = %signal.id,
            item_ref = %newest.id,
            "classifying newest item"
        );

        // Classify: outages degrade to Neutral/0.0 rather than aborting,
        // so a classifier failure cannot block the watermark forever
        let classification = match self
            .ctx
            .classifier
            .classify(&newest.text, signal.target_symbol.as_deref())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    signal_id = %signal.id,
                    error = %e,
                    "classifier failed, degrading to neutral"
                );
                Classification::neutral(format!("classifier error: {}", e))
            }
        };

        // Decide
        let actionable = classification.verdict.is_directional()
            && classification.confidence >= ACTION_CONFIDENCE_THRESHOLD;

        // Record: the event must exist before any externally visible
        // action, so a crash during dispatch still leaves an audit trail
        let event = self
            .ctx
            .events
            .append_event(NewEvent {
                signal_id: signal.id.clone(),
                item_ref: newest.id.clone(),
                item_excerpt: newest.text.clone(),
                item_author: newest.author.clone(),
                verdict: classification.verdict,
                confidence: classification.confidence,
                symbol_detected: classification.symbol.clone(),
            })
            .await?;
        if let Some(ref metrics) = self.ctx.metrics {
            metrics.events_recorded_total.inc();
        }

        let mut dispatched = false;
        if actionable {
            info!(
                signal_id = %signal.id,
                source_ref = %signal.source_ref,
                verdict = %classification.verdict,
                confidence = classification.confidence,
                "signal detected"
            );
            let (actions, action_result) = self.act_and_notify(&signal, &classification, newest).await;
            dispatched = actions.iter().any(|a| a == ACTION_DISPATCHED);

            // Single best-effort in-place update of the event row
            if let Err(e) = self
                .ctx
                .events
                .record_actions(&event.id, &actions, action_result)
                .await
            {
                warn!(
                    signal_id = %signal.id,
                    event_id = %event.id,
                    error = %e,
                    "failed to record actions on event"
                );
            }
        } else {
            debug!(
                signal_id = %signal.id,
                verdict = %classification.verdict,
                confidence = classification.confidence,
                "below action threshold, audit event only"
            );
        }

        // Advance: the final write of the cycle
        self.ctx
            .signals
            .mark_evaluated(&signal.id, Some(&newest.id), now)
            .await?;

        Ok(RunOutcome::Evaluated {
            event_id: event.id,
            dispatched,
        })
    }

    /// Steps 7 and 8: dispatch the action and deliver the notification.
    /// Neither failure aborts the cycle; both are reflected in the
    /// returned action tags and result payload.
    async fn act_and_notify(
        &self,
        signal: &Signal,
        classification: &Classification,
        item: &crate::services::SourceItem,
    ) -> (Vec<String>, Option<Value>) {
        let mut actions = Vec::new();
        let mut action_result: Option<Value> = None;

        let symbol = classification
            .symbol
            .clone()
            .or_else(|| signal.target_symbol.clone());

        match symbol.as_deref() {
            Some(symbol) => {
                match self
                    .ctx
                    .dispatcher
                    .dispatch(symbol, classification.verdict)
                    .await
                {
                    Ok(outcome) if outcome.success => {
                        actions.push(ACTION_DISPATCHED.to_string());
                        action_result = outcome.result;
                    }
                    Ok(outcome) => {
                        warn!(
                            signal_id = %signal.id,
                            symbol = %symbol,
                            "action dispatch reported failure"
                        );
                        if let Some(ref metrics) = self.ctx.metrics {
                            metrics.dispatch_failures_total.inc();
                        }
                        actions.push(ACTION_DISPATCH_FAILED.to_string());
                        action_result = outcome.result;
                    }
                    Err(e) => {
                        warn!(
                            signal_id = %signal.id,
                            symbol = %symbol,
                            error = %e,
                            "action dispatch failed"
                        );
                        if let Some(ref metrics) = self.ctx.metrics {
                            metrics.dispatch_failures_total.inc();
                        }
                        actions.push(ACTION_DISPATCH_FAILED.to_string());
                        action_result = Some(json!({ "error": e.to_string() }));
                    }
                }
            }
            None => {
                debug!(signal_id = %signal.id, "no symbol resolved, skipping dispatch");
            }
        }

        let message = format_signal_message(
            &signal.source_ref,
            classification.verdict,
            classification.confidence,
            symbol.as_deref(),
            &item.text,
            &classification.rationale,
            action_result.as_ref(),
        );
        match self.ctx.notifier.notify(&signal.id, &message).await {
            Ok(()) => actions.push(ACTION_NOTIFICATION_SENT.to_string()),
            Err(e) => {
                warn!(signal_id = %signal.id, error = %e, "notification delivery failed");
            }
        }

        (actions, action_result)
    }
}
