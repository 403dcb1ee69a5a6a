//! Feedwatch Monitor
//!
//! Runs the signal monitoring control loop: loads configuration, connects
//! the document store (or falls back to the in-memory store), wires the
//! collaborator adapters, and drives the scheduler until shutdown.

use dotenvy::dotenv;
use feedwatch::config;
use feedwatch::core::pipeline::{PipelineContext, SignalPipeline};
use feedwatch::core::scheduler::{SchedulerConfig, SignalScheduler};
use feedwatch::logging;
use feedwatch::metrics::Metrics;
use feedwatch::services::classifier::{Classifier, LlmClassifier};
use feedwatch::services::dispatcher::{ActionDispatcher, BacktestDispatcher};
use feedwatch::services::notifier::{ConversationNotifier, LogNotifier, NotificationSink};
use feedwatch::services::source::{HttpSourceFetcher, SourceFetcher};
use feedwatch::store::{EventStore, MemoryStore, PostgresStore, SignalStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let env = config::get_environment();
    info!("Starting Feedwatch Monitor");
    info!(environment = %env, "Environment");

    let metrics = Arc::new(Metrics::new()?);

    // Document store, with in-memory fallback for database-less runs
    let (signal_store, event_store): (Arc<dyn SignalStore>, Arc<dyn EventStore>) =
        match PostgresStore::new().await {
            Ok(store) => {
                info!("Postgres document store connected");
                metrics.database_connected.set(1.0);
                let store = Arc::new(store);
                (store.clone(), store)
            }
            Err(e) => {
                warn!(error = %e, "Postgres unavailable, using in-memory store");
                warn!("Signals and events will not survive a restart");
                metrics.database_connected.set(0.0);
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let bearer_token = config::get_source_bearer_token()
        .ok_or("SOURCE_BEARER_TOKEN is required for the source fetcher")?;
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(HttpSourceFetcher::new(
        config::get_source_api_base(),
        bearer_token,
    ));

    let api_key = config::get_classifier_api_key()
        .ok_or("CLASSIFIER_API_KEY is required for the classifier")?;
    let classifier: Arc<dyn Classifier> = Arc::new(LlmClassifier::new(
        config::get_classifier_api_base(),
        api_key,
        config::get_classifier_model(),
    ));

    let backtest_base = config::get_backtest_api_base()
        .ok_or("BACKTEST_API_BASE is required for the action dispatcher")?;
    let dispatcher: Arc<dyn ActionDispatcher> = Arc::new(BacktestDispatcher::new(backtest_base));

    let notifier: Arc<dyn NotificationSink> = match config::get_conversation_api_base() {
        Some(base) => {
            info!(base = %base, "Conversation notifications enabled");
            Arc::new(ConversationNotifier::new(base))
        }
        None => {
            info!("No conversation endpoint configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let ctx = Arc::new(PipelineContext {
        signals: signal_store.clone(),
        events: event_store,
        fetcher,
        classifier,
        dispatcher,
        notifier,
        metrics: Some(metrics.clone()),
    });
    let pipeline = Arc::new(SignalPipeline::new(ctx));

    let scheduler_config = SchedulerConfig {
        tick_interval: config::get_tick_interval(),
        max_concurrent_runs: config::get_max_concurrent_runs(),
    };
    info!(
        tick_secs = scheduler_config.tick_interval.as_secs(),
        max_concurrent = scheduler_config.max_concurrent_runs,
        "Scheduler configuration"
    );

    let scheduler = SignalScheduler::new(pipeline, signal_store, scheduler_config, Some(metrics));
    scheduler.start().await;

    info!("Feedwatch Monitor running, press Ctrl+C to stop");
    signal::ctrl_c().await?;

    info!("Shutdown requested, draining in-flight evaluations...");
    scheduler.stop().await;
    info!("Feedwatch Monitor stopped");

    Ok(())
}
