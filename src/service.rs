//! Long-running relay service.
//!
//! Wires the poller into the delivery engine over a bounded channel and runs
//! the retention sweep beside them until a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::config::{Config, ConfigError};
use crate::delivery::DeliveryEngine;
use crate::feed::FeedPoller;
use crate::model::Article;
use crate::present::EmbedPresenter;
use crate::sender::DiscordSender;
use crate::storage::{Database, DatabaseError, Store};

/// Articles buffered between the poller and the delivery loop.
const ARTICLE_QUEUE: usize = 256;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

/// HTTP client shared by feed fetching and the chat sender.
pub fn http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .build()
}

/// Opens the store named by `config`.
pub async fn open_store(config: &Config) -> Result<Database, DatabaseError> {
    let path = config.database_path.to_string_lossy();
    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(dir = %parent.display(), error = %e, "Failed to create database directory");
        }
    }
    Database::open(&path).await
}

/// Builds the delivery engine over the configured store and chat sender.
pub fn delivery_engine(
    config: &Config,
    store: Arc<dyn Store>,
    client: reqwest::Client,
) -> Result<DeliveryEngine, ConfigError> {
    let sender = DiscordSender::new(client, &config.discord_api_base, config.require_token()?);
    Ok(
        DeliveryEngine::new(store, Arc::new(sender), Arc::new(EmbedPresenter))
            .with_concurrency(config.delivery_concurrency),
    )
}

/// Runs the relay until `shutdown` completes.
///
/// Fails before any polling starts if the token is missing or the store
/// cannot be opened.
pub async fn run<F>(config: &Config, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()>,
{
    config.require_token()?;
    let store: Arc<Database> = Arc::new(open_store(config).await?);
    let client = http_client(config)?;
    let engine = Arc::new(delivery_engine(config, store.clone(), client.clone())?);

    let (article_tx, article_rx) = mpsc::channel(ARTICLE_QUEUE);
    let mut poller = FeedPoller::new(client, config.feed_sources(), config.poller_config());
    poller.start(article_tx);

    let delivery = tokio::spawn(delivery_loop(engine, article_rx));

    let (sweep_stop_tx, sweep_stop_rx) = watch::channel(false);
    let sweep = tokio::spawn(retention_sweep(
        store.clone(),
        config.retention(),
        config.retention_sweep_interval(),
        sweep_stop_rx,
    ));

    tracing::info!(
        feeds = poller.sources().len(),
        database = %config.database_path.display(),
        "Relay running"
    );

    shutdown.await;
    tracing::info!("Shutting down");

    // Stopping the poller drops every article sender, so the delivery loop
    // ends once the queue is drained
    poller.stop().await;
    match delivery.await {
        Ok(delivered) => tracing::info!(articles = delivered, "Delivery loop finished"),
        Err(e) => tracing::warn!(error = %e, "Delivery loop ended abnormally"),
    }

    let _ = sweep_stop_tx.send(true);
    if let Err(e) = sweep.await {
        tracing::warn!(error = %e, "Retention sweep ended abnormally");
    }

    Ok(())
}

/// Delivers queued articles one at a time, in arrival order.
///
/// Returns the number of articles processed once the channel closes.
pub async fn delivery_loop(engine: Arc<DeliveryEngine>, mut articles: mpsc::Receiver<Article>) -> usize {
    let mut processed = 0;
    while let Some(article) = articles.recv().await {
        engine.deliver(&article).await;
        processed += 1;
    }
    processed
}

/// Purges delivery records older than `retention` every `every`, starting
/// immediately, until `stop` flips.
pub async fn retention_sweep(
    store: Arc<dyn Store>,
    retention: Duration,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        match store.purge_deliveries_older_than(retention).await {
            Ok(deleted) => tracing::debug!(deleted = deleted, "Retention sweep complete"),
            Err(e) => tracing::warn!(error = %e, "Retention sweep failed"),
        }
    }
}

/// Completes on Ctrl-C, or on SIGTERM/SIGINT on Unix.
pub async fn shutdown_signal() -> Result<(), ServiceError> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    #[tokio::test]
    async fn test_run_fails_fast_without_token() {
        let config = Config {
            discord_token: None,
            database_path: "/nonexistent/never-created.db".into(),
            ..Config::default()
        };
        let result = run(&config, std::future::pending()).await;
        assert!(matches!(result, Err(ServiceError::Config(ConfigError::Missing(_)))));
        assert!(!std::path::Path::new("/nonexistent/never-created.db").exists());
    }

    #[tokio::test]
    async fn test_retention_sweep_purges_and_stops() {
        let db = Arc::new(Database::open(":memory:").await.unwrap());
        db.record_delivery_at("https://x/old", "g1", Language::En, 0)
            .await
            .unwrap();
        db.record_delivery("https://x/new", "g1", Language::En)
            .await
            .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweep = tokio::spawn(retention_sweep(
            db.clone(),
            Duration::from_secs(24 * 60 * 60),
            Duration::from_secs(3600),
            stop_rx,
        ));

        // The first tick fires immediately
        for _ in 0..50 {
            if !db.has_delivery("https://x/old", "g1").await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!db.has_delivery("https://x/old", "g1").await.unwrap());
        assert!(db.has_delivery("https://x/new", "g1").await.unwrap());

        stop_tx.send(true).unwrap();
        sweep.await.unwrap();
    }
}
