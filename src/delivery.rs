//! Delivery Engine: fans an article out to every subscribed destination.
//!
//! Per destination the steps are strictly ordered: check record, resolve
//! channel, send, record. Destinations are processed concurrently and never
//! affect each other.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Article, Destination, RecordOutcome};
use crate::present::{Presenter, RenderedMessage};
use crate::sender::{SendError, Sender};
use crate::storage::Store;

/// Default number of destinations served concurrently per article.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Terminal state of one (article, destination) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A delivery record already existed
    AlreadyPosted,
    /// Sent (and recorded, unless the record write failed)
    Sent,
    /// Logged and left for a later article to retry
    Failed,
    /// Channel gone; the subscription row was deleted
    DestinationRemoved,
}

/// Aggregate of one [`DeliveryEngine::deliver`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Destinations subscribed to the article's language
    pub destinations: usize,
    pub sent: usize,
    pub already_posted: usize,
    pub failed: usize,
    pub removed: usize,
}

impl DeliveryReport {
    fn tally(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::AlreadyPosted => self.already_posted += 1,
            DeliveryOutcome::Sent => self.sent += 1,
            DeliveryOutcome::Failed => self.failed += 1,
            DeliveryOutcome::DestinationRemoved => self.removed += 1,
        }
    }
}

/// Failures of [`DeliveryEngine::deliver_on_demand`], reported to the caller.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Could not resolve channel {channel_id}: {source}")]
    Resolve {
        channel_id: String,
        #[source]
        source: SendError,
    },

    #[error("Channel {channel_id} cannot receive messages")]
    NotSendable { channel_id: String },

    #[error("Sending to channel {channel_id} failed: {source}")]
    Send {
        channel_id: String,
        #[source]
        source: SendError,
    },
}

pub struct DeliveryEngine {
    store: Arc<dyn Store>,
    sender: Arc<dyn Sender>,
    presenter: Arc<dyn Presenter>,
    concurrency: usize,
}

impl DeliveryEngine {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn Sender>, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            store,
            sender,
            presenter,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many destinations are served at once (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Delivers `article` once to every destination subscribed to its language.
    ///
    /// Never fails: lookup and per-destination errors are logged and counted.
    /// Zero matching destinations is a normal, empty report.
    pub async fn deliver(&self, article: &Article) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        if article.url.is_empty() {
            tracing::warn!(title = %article.title, "Refusing to deliver article without a URL");
            return report;
        }

        let destinations = match self.store.list_destinations_for_language(article.language).await {
            Ok(destinations) => destinations,
            Err(e) => {
                tracing::error!(
                    language = %article.language,
                    error = %e,
                    "Failed to look up destinations"
                );
                return report;
            }
        };
        report.destinations = destinations.len();
        if destinations.is_empty() {
            tracing::debug!(language = %article.language, "No destinations subscribed");
            return report;
        }

        let rendered = self.presenter.render(article);
        let rendered = &rendered;

        let outcomes: Vec<DeliveryOutcome> = stream::iter(destinations)
            .map(move |dest| async move { self.deliver_to(article, rendered, &dest).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.tally(outcome);
        }

        tracing::info!(
            url = %article.url,
            language = %article.language,
            destinations = report.destinations,
            sent = report.sent,
            already_posted = report.already_posted,
            failed = report.failed,
            removed = report.removed,
            "Article delivered"
        );
        report
    }

    async fn deliver_to(
        &self,
        article: &Article,
        rendered: &RenderedMessage,
        dest: &Destination,
    ) -> DeliveryOutcome {
        match self.store.has_delivery(&article.url, &dest.guild_id).await {
            Ok(true) => return DeliveryOutcome::AlreadyPosted,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    guild_id = %dest.guild_id,
                    url = %article.url,
                    error = %e,
                    "Delivery record check failed"
                );
                return DeliveryOutcome::Failed;
            }
        }

        let channel = match self.sender.resolve_channel(&dest.channel_id).await {
            Ok(channel) => channel,
            Err(e) if e.is_gone() => return self.remove_destination(dest).await,
            Err(e) => {
                tracing::warn!(
                    guild_id = %dest.guild_id,
                    channel_id = %dest.channel_id,
                    error = %e,
                    "Channel resolution failed"
                );
                return DeliveryOutcome::Failed;
            }
        };

        if !channel.is_sendable() {
            tracing::warn!(
                guild_id = %dest.guild_id,
                channel_id = %dest.channel_id,
                kind = ?channel.kind,
                "Configured channel cannot receive messages"
            );
            return DeliveryOutcome::Failed;
        }

        match self.sender.send(&channel, rendered).await {
            Ok(()) => {}
            Err(e) if e.is_gone() => return self.remove_destination(dest).await,
            Err(e) => {
                tracing::warn!(
                    guild_id = %dest.guild_id,
                    channel_id = %dest.channel_id,
                    url = %article.url,
                    error = %e,
                    "Send failed"
                );
                return DeliveryOutcome::Failed;
            }
        }

        match self
            .store
            .record_delivery(&article.url, &dest.guild_id, article.language)
            .await
        {
            Ok(RecordOutcome::Recorded) => {}
            Ok(RecordOutcome::AlreadyRecorded) => {
                tracing::debug!(
                    guild_id = %dest.guild_id,
                    url = %article.url,
                    "Delivery already recorded by a concurrent writer"
                );
            }
            Err(e) => {
                // The message is out; a later redelivery is possible
                tracing::warn!(
                    guild_id = %dest.guild_id,
                    url = %article.url,
                    error = %e,
                    "Sent but failed to record delivery"
                );
            }
        }
        DeliveryOutcome::Sent
    }

    async fn remove_destination(&self, dest: &Destination) -> DeliveryOutcome {
        match self
            .store
            .delete_destination_language(&dest.guild_id, dest.language)
            .await
        {
            Ok(_) => {
                tracing::info!(
                    guild_id = %dest.guild_id,
                    channel_id = %dest.channel_id,
                    language = %dest.language,
                    "Channel no longer exists, subscription removed"
                );
                DeliveryOutcome::DestinationRemoved
            }
            Err(e) => {
                tracing::warn!(
                    guild_id = %dest.guild_id,
                    error = %e,
                    "Failed to remove subscription for deleted channel"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    /// Sends `article` to `channel_id` unconditionally.
    ///
    /// Skips the subscription lookup and the delivery record entirely, and
    /// writes no record.
    ///
    /// # Errors
    ///
    /// Any failure to resolve or post to the channel, including a channel
    /// that exists but cannot receive messages.
    pub async fn deliver_on_demand(&self, channel_id: &str, article: &Article) -> Result<(), DeliveryError> {
        let channel = self
            .sender
            .resolve_channel(channel_id)
            .await
            .map_err(|source| DeliveryError::Resolve {
                channel_id: channel_id.to_string(),
                source,
            })?;

        if !channel.is_sendable() {
            return Err(DeliveryError::NotSendable {
                channel_id: channel_id.to_string(),
            });
        }

        let rendered = self.presenter.render(article);
        self.sender
            .send(&channel, &rendered)
            .await
            .map_err(|source| DeliveryError::Send {
                channel_id: channel_id.to_string(),
                source,
            })
    }
}
