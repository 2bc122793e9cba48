//! Feed Poller: one independent polling task per feed.
//!
//! Each task owns its feed's [`SeenSet`]; nothing is shared between feeds
//! except the outbound [`mpsc`] channel of new articles.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::fetcher::{fetch_snapshot, FetchOptions};
use crate::language::Language;
use crate::model::Article;

/// Default polling interval (5 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300_000);

/// Default number of links remembered per feed.
pub const DEFAULT_SEEN_CAPACITY: usize = 500;

/// A monitored feed and the language it publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub language: Language,
    pub url: String,
}

impl FeedSource {
    pub fn new(language: Language, url: impl Into<String>) -> Self {
        Self {
            language,
            url: url.into(),
        }
    }

    /// The canonical feed of every supported language.
    pub fn defaults() -> Vec<FeedSource> {
        Language::ALL
            .iter()
            .map(|&lang| FeedSource::new(lang, lang.feed_url()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub seen_capacity: NonZeroUsize,
    pub fetch: FetchOptions,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            seen_capacity: NonZeroUsize::new(DEFAULT_SEEN_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            fetch: FetchOptions::default(),
        }
    }
}

// ============================================================================
// SeenSet
// ============================================================================

/// Links already observed for one feed.
///
/// The first observed snapshot only seeds the set. Bounded: the least
/// recently observed links are forgotten once `capacity` is exceeded, and
/// links still present in the feed are refreshed on every poll.
pub struct SeenSet {
    links: LruCache<String, ()>,
    seeded: bool,
}

impl SeenSet {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            links: LruCache::new(capacity),
            seeded: false,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn contains(&self, url: &str) -> bool {
        self.links.contains(url)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Records a snapshot and returns its unseen articles in snapshot order.
    ///
    /// Returns nothing on the first call.
    pub fn observe(&mut self, snapshot: Vec<Article>) -> Vec<Article> {
        let mut fresh = Vec::new();
        for article in snapshot {
            if self.links.get(article.url.as_str()).is_some() {
                continue;
            }
            self.links.put(article.url.clone(), ());
            if self.seeded {
                fresh.push(article);
            }
        }
        self.seeded = true;
        fresh
    }
}

// ============================================================================
// FeedPoller
// ============================================================================

/// Polls every configured feed on its own interval and emits new articles.
///
/// ```no_run
/// # async fn demo() {
/// use feedrelay::feed::{FeedPoller, FeedSource, PollerConfig};
///
/// let (tx, mut rx) = tokio::sync::mpsc::channel(64);
/// let mut poller = FeedPoller::new(reqwest::Client::new(), FeedSource::defaults(), PollerConfig::default());
/// poller.start(tx);
/// while let Some(article) = rx.recv().await {
///     println!("{}", article.title);
/// }
/// poller.stop().await;
/// # }
/// ```
pub struct FeedPoller {
    client: reqwest::Client,
    sources: Vec<FeedSource>,
    config: PollerConfig,
    running: Option<Running>,
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FeedPoller {
    pub fn new(client: reqwest::Client, sources: Vec<FeedSource>, config: PollerConfig) -> Self {
        Self {
            client,
            sources,
            config,
            running: None,
        }
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns one polling task per feed, emitting new articles into `sink`.
    ///
    /// The first tick of every feed fires immediately. Calling `start` on a
    /// running poller does nothing.
    pub fn start(&mut self, sink: mpsc::Sender<Article>) {
        if self.running.is_some() {
            tracing::warn!("Feed poller already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));

        let tasks = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let task = FeedTask {
                    source,
                    client: self.client.clone(),
                    config: self.config.clone(),
                    sink: sink.clone(),
                    alive: Arc::clone(&alive),
                };
                tokio::spawn(task.run(shutdown_rx.clone()))
            })
            .collect();

        tracing::info!(
            feeds = self.sources.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Feed poller started"
        );

        self.running = Some(Running {
            shutdown_tx,
            alive,
            tasks,
        });
    }

    /// Cancels every feed's timer and waits for the tasks to exit.
    ///
    /// A fetch in flight is abandoned and its result discarded.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.alive.store(false, Ordering::Release);
        // Receivers may already be gone if every task exited
        let _ = running.shutdown_tx.send(true);

        for task in running.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Feed polling task ended abnormally");
            }
        }
        tracing::info!("Feed poller stopped");
    }
}

struct FeedTask {
    source: FeedSource,
    client: reqwest::Client,
    config: PollerConfig,
    sink: mpsc::Sender<Article>,
    alive: Arc<AtomicBool>,
}

impl FeedTask {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut seen = SeenSet::new(self.config.seen_capacity);
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let fetch = fetch_snapshot(
                &self.client,
                &self.source.url,
                self.source.language,
                &self.config.fetch,
            );
            let result = tokio::select! {
                result = fetch => result,
                _ = shutdown.changed() => break,
            };

            if !self.alive.load(Ordering::Acquire) {
                break;
            }

            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(
                        feed = %self.source.url,
                        language = %self.source.language,
                        error = %e,
                        "Feed poll failed, retrying next tick"
                    );
                    continue;
                }
            };

            let seeding = !seen.is_seeded();
            let fresh = seen.observe(snapshot.articles);
            if seeding {
                tracing::info!(
                    feed = %self.source.url,
                    seen = seen.len(),
                    "Feed seeded"
                );
                continue;
            }

            if !fresh.is_empty() {
                tracing::info!(
                    feed = %self.source.url,
                    new = fresh.len(),
                    "New articles detected"
                );
            }

            for article in fresh {
                if !self.alive.load(Ordering::Acquire) {
                    return;
                }
                if self.sink.send(article).await.is_err() {
                    tracing::debug!(feed = %self.source.url, "Article receiver dropped");
                    return;
                }
            }
        }

        tracing::debug!(feed = %self.source.url, "Feed polling task exiting");
    }
}
