//! Environment-backed configuration
//!
//! All knobs come from environment variables (loaded from `.env` by the
//! binary) with sensible sandbox defaults.

use std::env;
use std::time::Duration;

/// Current environment name ("production", "sandbox", ...)
pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

/// Postgres connection string for the document store, if configured
pub fn get_database_url() -> Option<String> {
    env::var("DATABASE_URL").ok().filter(|s| !s.is_empty())
}

/// Base URL of the social source API
pub fn get_source_api_base() -> String {
    env::var("SOURCE_API_BASE").unwrap_or_else(|_| "https://api.x.com/2".to_string())
}

/// Bearer token for the social source API
pub fn get_source_bearer_token() -> Option<String> {
    env::var("SOURCE_BEARER_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Base URL of the chat-completion classifier API
pub fn get_classifier_api_base() -> String {
    env::var("CLASSIFIER_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

pub fn get_classifier_api_key() -> Option<String> {
    env::var("CLASSIFIER_API_KEY").ok().filter(|s| !s.is_empty())
}

pub fn get_classifier_model() -> String {
    env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string())
}

/// Base URL of the backtest service driven by the action dispatcher
pub fn get_backtest_api_base() -> Option<String> {
    env::var("BACKTEST_API_BASE").ok().filter(|s| !s.is_empty())
}

/// Base URL of the conversation service for signal notifications
pub fn get_conversation_api_base() -> Option<String> {
    env::var("CONVERSATION_API_BASE").ok().filter(|s| !s.is_empty())
}

/// Scheduler tick period (default 60s)
pub fn get_tick_interval() -> Duration {
    let secs = env::var("TICK_INTERVAL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60u64);
    Duration::from_secs(secs.max(1))
}

/// Maximum concurrently running pipeline evaluations (default 8)
pub fn get_max_concurrent_runs() -> usize {
    env::var("MAX_CONCURRENT_RUNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8usize)
        .max(1)
}
