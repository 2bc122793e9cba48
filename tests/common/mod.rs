//! Shared fixtures for integration tests: an in-memory store, a store that
//! fails on demand, and a recording chat sender.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use feedrelay::delivery::DeliveryEngine;
use feedrelay::language::Language;
use feedrelay::model::{Article, DeliveryRecord, Destination, RecordOutcome};
use feedrelay::present::{EmbedPresenter, RenderedMessage};
use feedrelay::sender::{Channel, ChannelKind, SendError, Sender};
use feedrelay::storage::{Database, Store, StoreError, StoreResult};
use std::time::Duration;

pub async fn test_db() -> Arc<Database> {
    Arc::new(Database::open(":memory:").await.unwrap())
}

pub fn article(url: &str, language: Language) -> Article {
    Article {
        title: format!("Title of {}", url),
        url: url.to_string(),
        description: "Description".to_string(),
        category: "Illustration".to_string(),
        image_url: String::new(),
        language,
        published_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
    }
}

#[derive(Default)]
struct FakeState {
    /// (channel_id, embed title) in send order
    sent: Vec<(String, String)>,
    resolved: Vec<String>,
    gone: HashSet<String>,
    voice: HashSet<String>,
    failing: HashSet<String>,
}

/// Sender that records every call and fails on configured channels.
#[derive(Clone, Default)]
pub struct FakeSender {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution reports the channel deleted.
    pub fn mark_gone(&self, channel_id: &str) {
        self.state.lock().unwrap().gone.insert(channel_id.to_string());
    }

    /// Resolves to a channel type that cannot receive messages.
    pub fn mark_voice(&self, channel_id: &str) {
        self.state.lock().unwrap().voice.insert(channel_id.to_string());
    }

    /// Sends fail with a non-gone API error.
    pub fn mark_failing(&self, channel_id: &str) {
        self.state.lock().unwrap().failing.insert(channel_id.to_string());
    }

    pub fn heal(&self, channel_id: &str) {
        self.state.lock().unwrap().failing.remove(channel_id);
    }

    pub fn sends_to(&self, channel_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| c == channel_id)
            .count()
    }

    pub fn total_sends(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn sent_titles(&self, channel_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| c == channel_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn was_resolved(&self, channel_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .resolved
            .iter()
            .any(|c| c == channel_id)
    }
}

#[async_trait]
impl Sender for FakeSender {
    async fn resolve_channel(&self, channel_id: &str) -> Result<Channel, SendError> {
        let mut state = self.state.lock().unwrap();
        state.resolved.push(channel_id.to_string());
        if state.gone.contains(channel_id) {
            return Err(SendError::Gone {
                channel_id: channel_id.to_string(),
            });
        }
        let kind = if state.voice.contains(channel_id) {
            ChannelKind::from_type_code(2)
        } else {
            ChannelKind::Text
        };
        Ok(Channel {
            id: channel_id.to_string(),
            kind,
        })
    }

    async fn send(&self, channel: &Channel, message: &RenderedMessage) -> Result<(), SendError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&channel.id) {
            return Err(SendError::Api {
                status: 500,
                code: None,
                message: "Internal Server Error".to_string(),
            });
        }
        let title = message
            .embeds
            .first()
            .map(|e| e.title.clone())
            .unwrap_or_default();
        state.sent.push((channel.id.clone(), title));
        Ok(())
    }
}

pub fn engine(db: Arc<Database>, sender: &FakeSender) -> DeliveryEngine {
    DeliveryEngine::new(db, Arc::new(sender.clone()), Arc::new(EmbedPresenter))
}

/// Map of every channel to its send count, for compact assertions.
pub fn send_counts(sender: &FakeSender, channels: &[&str]) -> HashMap<String, usize> {
    channels
        .iter()
        .map(|c| (c.to_string(), sender.sends_to(c)))
        .collect()
}

/// Which [`Store`] call [`FlakyStore`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    HasDelivery,
    RecordDelivery,
}

/// Store over a real database that fails one operation for one guild.
pub struct FlakyStore {
    inner: Arc<Database>,
    guild_id: String,
    fail_on: FailOn,
}

impl FlakyStore {
    pub fn new(inner: Arc<Database>, guild_id: &str, fail_on: FailOn) -> Self {
        Self {
            inner,
            guild_id: guild_id.to_string(),
            fail_on,
        }
    }

    fn check(&self, op: FailOn, guild_id: &str) -> StoreResult<()> {
        if op == self.fail_on && guild_id == self.guild_id {
            return Err(StoreError::CorruptRow {
                table: "deliveries",
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn upsert_destination_languages(
        &self,
        guild_id: &str,
        channel_id: &str,
        languages: &[Language],
    ) -> StoreResult<Vec<Destination>> {
        self.inner
            .upsert_destination_languages(guild_id, channel_id, languages)
            .await
    }

    async fn list_destinations_for_language(
        &self,
        language: Language,
    ) -> StoreResult<Vec<Destination>> {
        self.inner.list_destinations_for_language(language).await
    }

    async fn list_destinations_for_guild(&self, guild_id: &str) -> StoreResult<Vec<Destination>> {
        self.inner.list_destinations_for_guild(guild_id).await
    }

    async fn list_all_destinations(&self) -> StoreResult<Vec<Destination>> {
        self.inner.list_all_destinations().await
    }

    async fn delete_destination(&self, guild_id: &str) -> StoreResult<u64> {
        self.inner.delete_destination(guild_id).await
    }

    async fn delete_destination_language(
        &self,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<u64> {
        self.inner.delete_destination_language(guild_id, language).await
    }

    async fn has_delivery(&self, article_url: &str, guild_id: &str) -> StoreResult<bool> {
        self.check(FailOn::HasDelivery, guild_id)?;
        self.inner.has_delivery(article_url, guild_id).await
    }

    async fn record_delivery(
        &self,
        article_url: &str,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<RecordOutcome> {
        self.check(FailOn::RecordDelivery, guild_id)?;
        self.inner.record_delivery(article_url, guild_id, language).await
    }

    async fn count_deliveries(&self, guild_id: &str) -> StoreResult<i64> {
        self.inner.count_deliveries(guild_id).await
    }

    async fn recent_deliveries(
        &self,
        guild_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        self.inner.recent_deliveries(guild_id, limit).await
    }

    async fn purge_deliveries_older_than(&self, age: Duration) -> StoreResult<u64> {
        self.inner.purge_deliveries_older_than(age).await
    }
}

pub fn flaky_engine(store: FlakyStore, sender: &FakeSender) -> DeliveryEngine {
    DeliveryEngine::new(Arc::new(store), Arc::new(sender.clone()), Arc::new(EmbedPresenter))
}
