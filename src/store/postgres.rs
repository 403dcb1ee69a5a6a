//! Postgres-backed document store for signals and events
//!
//! Lifecycle state is stored as text, action payloads as JSON string
//! columns. Each mutation is a single-row statement keyed by id.

use crate::config;
use crate::error::StoreError;
use crate::models::{
    LifecycleState, NewEvent, NewSignal, Signal, SignalChanges, SignalEvent, Verdict,
};
use crate::store::{EventStore, SignalStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

pub struct PostgresStore {
    client: Arc<RwLock<Option<Client>>>,
}

impl PostgresStore {
    pub async fn new() -> Result<Self, StoreError> {
        let url = config::get_database_url()
            .ok_or_else(|| StoreError::Unavailable("DATABASE_URL not configured".to_string()))?;
        Self::connect(&url).await
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect: {}", e)))?;

        // Spawn connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        let store = Self {
            client: Arc::new(RwLock::new(Some(client))),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        c.batch_execute(
            "CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                source_ref TEXT NOT NULL,
                target_symbol TEXT,
                interval_secs DOUBLE PRECISION NOT NULL,
                lifecycle_state TEXT NOT NULL,
                watermark TEXT,
                last_evaluated_at TIMESTAMPTZ,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_owner ON signals(owner_id);
            CREATE INDEX IF NOT EXISTS idx_signals_state ON signals(lifecycle_state);

            CREATE TABLE IF NOT EXISTS signal_events (
                id TEXT PRIMARY KEY,
                signal_id TEXT NOT NULL,
                item_ref TEXT NOT NULL,
                item_excerpt TEXT NOT NULL,
                item_author TEXT NOT NULL,
                verdict TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                symbol_detected TEXT,
                actions_json TEXT NOT NULL DEFAULT '[]',
                action_result_json TEXT,
                timestamp TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_signal ON signal_events(signal_id);",
        )
        .await
        .map_err(|e| StoreError::Query(format!("failed to init schema: {}", e)))?;

        Ok(())
    }

    fn signal_from_row(row: &Row) -> Result<Signal, StoreError> {
        let state_str: String = row.get("lifecycle_state");
        let lifecycle_state = parse_state(&state_str)?;
        let interval_secs: f64 = row.get("interval_secs");
        Ok(Signal {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            source_ref: row.get("source_ref"),
            target_symbol: row.get("target_symbol"),
            interval: Duration::from_secs_f64(interval_secs),
            lifecycle_state,
            watermark: row.get("watermark"),
            last_evaluated_at: row.get("last_evaluated_at"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn event_from_row(row: &Row) -> Result<SignalEvent, StoreError> {
        let verdict_str: String = row.get("verdict");
        let verdict = parse_verdict(&verdict_str)?;
        let actions_json: String = row.get("actions_json");
        let actions_taken: Vec<String> = serde_json::from_str(&actions_json)
            .map_err(|e| StoreError::Serialization(format!("bad actions_json: {}", e)))?;
        let action_result_json: Option<String> = row.get("action_result_json");
        let action_result = match action_result_json {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Serialization(format!("bad action_result: {}", e)))?,
            ),
            None => None,
        };
        Ok(SignalEvent {
            id: row.get("id"),
            signal_id: row.get("signal_id"),
            item_ref: row.get("item_ref"),
            item_excerpt: row.get("item_excerpt"),
            item_author: row.get("item_author"),
            verdict,
            confidence: row.get("confidence"),
            symbol_detected: row.get("symbol_detected"),
            actions_taken,
            action_result,
            timestamp: row.get("timestamp"),
        })
    }
}

fn parse_state(s: &str) -> Result<LifecycleState, StoreError> {
    match s {
        "active" => Ok(LifecycleState::Active),
        "paused" => Ok(LifecycleState::Paused),
        "stopped" => Ok(LifecycleState::Stopped),
        other => Err(StoreError::Serialization(format!(
            "unknown lifecycle state '{}'",
            other
        ))),
    }
}

fn parse_verdict(s: &str) -> Result<Verdict, StoreError> {
    match s {
        "positive" => Ok(Verdict::Positive),
        "negative" => Ok(Verdict::Negative),
        "neutral" => Ok(Verdict::Neutral),
        other => Err(StoreError::Serialization(format!(
            "unknown verdict '{}'",
            other
        ))),
    }
}

#[async_trait]
impl SignalStore for PostgresStore {
    async fn create_signal(&self, new: NewSignal) -> Result<Signal, StoreError> {
        if new.interval.is_zero() {
            return Err(StoreError::InvalidSignal("interval must be > 0".to_string()));
        }
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

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

        c.execute(
            "INSERT INTO signals (id, owner_id, source_ref, target_symbol, interval_secs,
                lifecycle_state, watermark, last_evaluated_at, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, $7, $8, $9)",
            &[
                &signal.id,
                &signal.owner_id,
                &signal.source_ref,
                &signal.target_symbol,
                &signal.interval.as_secs_f64(),
                &signal.lifecycle_state.to_string(),
                &signal.description,
                &signal.created_at,
                &signal.updated_at,
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("failed to insert signal: {}", e)))?;

        Ok(signal)
    }

    async fn get_signal(&self, id: &str) -> Result<Option<Signal>, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let row = c
            .query_opt("SELECT * FROM signals WHERE id = $1", &[&id])
            .await
            .map_err(|e| StoreError::Query(format!("failed to query signal: {}", e)))?;

        row.as_ref().map(Self::signal_from_row).transpose()
    }

    async fn list_signals(
        &self,
        owner_id: &str,
        state: Option<LifecycleState>,
        limit: usize,
    ) -> Result<Vec<Signal>, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let rows = match state {
            Some(st) => {
                c.query(
                    "SELECT * FROM signals
                     WHERE owner_id = $1 AND lifecycle_state = $2
                     ORDER BY created_at DESC LIMIT $3",
                    &[&owner_id, &st.to_string(), &(limit as i64)],
                )
                .await
            }
            None => {
                c.query(
                    "SELECT * FROM signals
                     WHERE owner_id = $1
                     ORDER BY created_at DESC LIMIT $2",
                    &[&owner_id, &(limit as i64)],
                )
                .await
            }
        }
        .map_err(|e| StoreError::Query(format!("failed to list signals: {}", e)))?;

        rows.iter().map(Self::signal_from_row).collect()
    }

    async fn list_active_signals(&self) -> Result<Vec<Signal>, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let rows = c
            .query(
                "SELECT * FROM signals WHERE lifecycle_state = 'active'",
                &[],
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to list active signals: {}", e)))?;

        rows.iter().map(Self::signal_from_row).collect()
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
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let row = c
            .query_opt(
                "UPDATE signals SET
                    interval_secs = COALESCE($2, interval_secs),
                    description = COALESCE($3, description),
                    updated_at = $4
                 WHERE id = $1
                 RETURNING *",
                &[
                    &id,
                    &changes.interval.map(|i| i.as_secs_f64()),
                    &changes.description,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to update signal: {}", e)))?;

        row.as_ref().map(Self::signal_from_row).transpose()
    }

    async fn transition_signal(
        &self,
        id: &str,
        to: LifecycleState,
    ) -> Result<Option<Signal>, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        // Read-then-update; the state machine check happens app-side and
        // the update is conditional on the state we read.
        let row = c
            .query_opt("SELECT * FROM signals WHERE id = $1", &[&id])
            .await
            .map_err(|e| StoreError::Query(format!("failed to query signal: {}", e)))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let current = Self::signal_from_row(&row)?;
        if !current.lifecycle_state.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: current.lifecycle_state.to_string(),
                to: to.to_string(),
            });
        }

        let row = c
            .query_opt(
                "UPDATE signals SET lifecycle_state = $2, updated_at = $3
                 WHERE id = $1 AND lifecycle_state = $4
                 RETURNING *",
                &[
                    &id,
                    &to.to_string(),
                    &Utc::now(),
                    &current.lifecycle_state.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to transition signal: {}", e)))?;

        row.as_ref().map(Self::signal_from_row).transpose()
    }

    async fn mark_evaluated(
        &self,
        id: &str,
        watermark: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let updated = c
            .execute(
                "UPDATE signals SET
                    last_evaluated_at = $2,
                    watermark = CASE
                        WHEN $3::TEXT IS NULL THEN watermark
                        WHEN watermark IS NULL THEN $3
                        WHEN length($3::TEXT) > length(watermark)
                             OR (length($3::TEXT) = length(watermark) AND $3 > watermark)
                            THEN $3
                        ELSE watermark
                    END,
                    updated_at = $4
                 WHERE id = $1",
                &[&id, &at, &watermark, &Utc::now()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to mark evaluated: {}", e)))?;

        if updated == 0 {
            return Err(StoreError::Query(format!("signal {} not found", id)));
        }
        Ok(())
    }

    async fn delete_signal(&self, id: &str) -> Result<bool, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        c.execute("DELETE FROM signal_events WHERE signal_id = $1", &[&id])
            .await
            .map_err(|e| StoreError::Query(format!("failed to delete events: {}", e)))?;
        let deleted = c
            .execute("DELETE FROM signals WHERE id = $1", &[&id])
            .await
            .map_err(|e| StoreError::Query(format!("failed to delete signal: {}", e)))?;

        Ok(deleted > 0)
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn append_event(&self, new: NewEvent) -> Result<SignalEvent, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

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

        c.execute(
            "INSERT INTO signal_events (id, signal_id, item_ref, item_excerpt, item_author,
                verdict, confidence, symbol_detected, actions_json, action_result_json, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '[]', NULL, $9)",
            &[
                &event.id,
                &event.signal_id,
                &event.item_ref,
                &event.item_excerpt,
                &event.item_author,
                &event.verdict.to_string(),
                &event.confidence,
                &event.symbol_detected,
                &event.timestamp,
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("failed to append event: {}", e)))?;

        Ok(event)
    }

    async fn record_actions(
        &self,
        event_id: &str,
        actions: &[String],
        action_result: Option<Value>,
    ) -> Result<(), StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let actions_json = serde_json::to_string(actions)
            .map_err(|e| StoreError::Serialization(format!("failed to serialize actions: {}", e)))?;
        let result_json = action_result
            .map(|v| serde_json::to_string(&v))
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("failed to serialize result: {}", e)))?;

        let updated = c
            .execute(
                "UPDATE signal_events SET actions_json = $2, action_result_json = $3
                 WHERE id = $1",
                &[&event_id, &actions_json, &result_json],
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to record actions: {}", e)))?;

        if updated == 0 {
            return Err(StoreError::Query(format!("event {} not found", event_id)));
        }
        Ok(())
    }

    async fn events_for_signal(
        &self,
        signal_id: &str,
        verdict: Option<Verdict>,
        limit: usize,
    ) -> Result<Vec<SignalEvent>, StoreError> {
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let rows = match verdict {
            Some(v) => {
                c.query(
                    "SELECT * FROM signal_events
                     WHERE signal_id = $1 AND verdict = $2
                     ORDER BY timestamp DESC LIMIT $3",
                    &[&signal_id, &v.to_string(), &(limit as i64)],
                )
                .await
            }
            None => {
                c.query(
                    "SELECT * FROM signal_events
                     WHERE signal_id = $1
                     ORDER BY timestamp DESC LIMIT $2",
                    &[&signal_id, &(limit as i64)],
                )
                .await
            }
        }
        .map_err(|e| StoreError::Query(format!("failed to query events: {}", e)))?;

        rows.iter().map(Self::event_from_row).collect()
    }

    async fn recent_events(
        &self,
        signal_ids: &[String],
        limit: usize,
    ) -> Result<Vec<SignalEvent>, StoreError> {
        if signal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.client.read().await;
        let c = client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database client".to_string()))?;

        let ids: Vec<&str> = signal_ids.iter().map(|s| s.as_str()).collect();
        let rows = c
            .query(
                "SELECT * FROM signal_events
                 WHERE signal_id = ANY($1)
                 ORDER BY timestamp DESC LIMIT $2",
                &[&ids, &(limit as i64)],
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to query recent events: {}", e)))?;

        rows.iter().map(Self::event_from_row).collect()
    }
}
