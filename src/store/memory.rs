//! In-memory store backing tests and database-less sandbox runs

use crate::error::StoreError;
use crate::models::{
    LifecycleState, NewEvent, NewSignal, Signal, SignalChanges, SignalEvent, Verdict,
};
use crate::store::{EventStore, SignalStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Implements both `SignalStore` and `EventStore` over tokio RwLocks.
/// Mutations take the write lock for their whole read-modify-write, which
/// gives the same per-row atomicity the document store provides.
#[derive(Default)]
pub struct MemoryStore {
    signals: RwLock<HashMap<String, Signal>>,
    events: RwLock<Vec<SignalEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn create_signal(&self, new: NewSignal) -> Result<Signal, StoreError> {
        if new.interval.is_zero() {
            return Err(StoreError::InvalidSignal("interval must be > 0".to_string()));
        }
        let now = Utc::now();
        let signal = Signal {
            id: Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            source_ref: new.source_ref.trim_start_matches('@').to_string(),
            target_symbol: new.target_symbol,
            interval: new.interval,
            lifecycle_state: LifecycleState::Active,
            watermark: None,
            last_evaluated_at: None,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        self.signals
            .write()
            .await
            .insert(signal.id.clone(), signal.clone());
        Ok(signal)
    }

    async fn get_signal(&self, id: &str) -> Result<Option<Signal>, StoreError> {
        Ok(self.signals.read().await.get(id).cloned())
    }

    async fn list_signals(
        &self,
        owner_id: &str,
        state: Option<LifecycleState>,
        limit: usize,
    ) -> Result<Vec<Signal>, StoreError> {
        let signals = self.signals.read().await;
        let mut out: Vec<Signal> = signals
            .values()
            .filter(|s| s.owner_id == owner_id)
            .filter(|s| state.map_or(true, |st| s.lifecycle_state == st))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn list_active_signals(&self) -> Result<Vec<Signal>, StoreError> {
        let signals = self.signals.read().await;
        Ok(signals
            .values()
            .filter(|s| s.lifecycle_state == LifecycleState::Active)
            .cloned()
            .collect())
    }

    async fn update_signal(
        &self,
        id: &str,
        changes: SignalChanges,
    ) -> Result<Option<Signal>, StoreError> {
        if let Some(interval) = changes.interval {
            if interval.is_zero() {
                return Err(StoreError::InvalidSignal("interval must be > 0".to_string()));
            }
        }
        let mut signals = self.signals.write().await;
        let Some(signal) = signals.get_mut(id) else {
            return Ok(None);
        };
        if let Some(interval) = changes.interval {
            signal.interval = interval;
        }
        if let Some(description) = changes.description {
            signal.description = Some(description);
        }
        signal.updated_at = Utc::now();
        Ok(Some(signal.clone()))
    }

    async fn transition_signal(
        &self,
        id: &str,
        to: LifecycleState,
    ) -> Result<Option<Signal>, StoreError> {
        let mut signals = self.signals.write().await;
        let Some(signal) = signals.get_mut(id) else {
            return Ok(None);
        };
        if !signal.lifecycle_state.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: signal.lifecycle_state.to_string(),
                to: to.to_string(),
            });
        }
        signal.lifecycle_state = to;
        signal.updated_at = Utc::now();
        Ok(Some(signal.clone()))
    }

    async fn mark_evaluated(
        &self,
        id: &str,
        watermark: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut signals = self.signals.write().await;
        let Some(signal) = signals.get_mut(id) else {
            return Err(StoreError::Query(format!("signal {} not found", id)));
        };
        signal.last_evaluated_at = Some(at);
        if let Some(mark) = watermark {
            let advances = signal
                .watermark
                .as_deref()
                .map_or(true, |current| super::watermark_advances(mark, current));
            if advances {
                signal.watermark = Some(mark.to_string());
            }
        }
        signal.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_signal(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.signals.write().await.remove(id).is_some();
        if removed {
            self.events.write().await.retain(|e| e.signal_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(&self, new: NewEvent) -> Result<SignalEvent, StoreError> {
        let event = SignalEvent {
            id: Uuid::new_v4().to_string(),
            signal_id: new.signal_id,
            item_ref: new.item_ref,
            item_excerpt: new.item_excerpt,
            item_author: new.item_author,
            verdict: new.verdict,
            confidence: new.confidence,
            symbol_detected: new.symbol_detected,
            actions_taken: Vec::new(),
            action_result: None,
            timestamp: Utc::now(),
        };
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn record_actions(
        &self,
        event_id: &str,
        actions: &[String],
        action_result: Option<Value>,
    ) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        let Some(event) = events.iter_mut().find(|e| e.id == event_id) else {
            return Err(StoreError::Query(format!("event {} not found", event_id)));
        };
        event.actions_taken = actions.to_vec();
        event.action_result = action_result;
        Ok(())
    }

    async fn events_for_signal(
        &self,
        signal_id: &str,
        verdict: Option<Verdict>,
        limit: usize,
    ) -> Result<Vec<SignalEvent>, StoreError> {
        let events = self.events.read().await;
        let mut out: Vec<SignalEvent> = events
            .iter()
            .filter(|e| e.signal_id == signal_id)
            .filter(|e| verdict.map_or(true, |v| e.verdict == v))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    async fn recent_events(
        &self,
        signal_ids: &[String],
        limit: usize,
    ) -> Result<Vec<SignalEvent>, StoreError> {
        let events = self.events.read().await;
        let mut out: Vec<SignalEvent> = events
            .iter()
            .filter(|e| signal_ids.iter().any(|id| *id == e.signal_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }
}
