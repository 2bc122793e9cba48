use async_trait::async_trait;
use std::time::Duration;

use super::schema::Database;
use super::types::StoreResult;
use crate::language::Language;
use crate::model::{DeliveryRecord, Destination, RecordOutcome};

/// Persistence the delivery pipeline depends on.
///
/// Implementations are shared, externally synchronized resources: callers
/// never assume exclusive access, and uniqueness of `(guild, language)`
/// subscriptions and `(article_url, guild)` delivery records is enforced by
/// the implementation, not by the caller.
#[async_trait]
pub trait Store: Send + Sync {
    /// Route `languages` of `guild_id` to `channel_id`.
    async fn upsert_destination_languages(
        &self,
        guild_id: &str,
        channel_id: &str,
        languages: &[Language],
    ) -> StoreResult<Vec<Destination>>;

    async fn list_destinations_for_language(
        &self,
        language: Language,
    ) -> StoreResult<Vec<Destination>>;

    async fn list_destinations_for_guild(&self, guild_id: &str) -> StoreResult<Vec<Destination>>;

    async fn list_all_destinations(&self) -> StoreResult<Vec<Destination>>;

    /// Remove every subscription of a guild.
    async fn delete_destination(&self, guild_id: &str) -> StoreResult<u64>;

    /// Remove a single `(guild, language)` subscription.
    async fn delete_destination_language(
        &self,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<u64>;

    async fn has_delivery(&self, article_url: &str, guild_id: &str) -> StoreResult<bool>;

    /// Must tolerate being called twice for the same key, reporting
    /// [`RecordOutcome::AlreadyRecorded`] the second time.
    async fn record_delivery(
        &self,
        article_url: &str,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<RecordOutcome>;

    async fn count_deliveries(&self, guild_id: &str) -> StoreResult<i64>;

    /// Newest first.
    async fn recent_deliveries(&self, guild_id: &str, limit: i64)
        -> StoreResult<Vec<DeliveryRecord>>;

    async fn purge_deliveries_older_than(&self, age: Duration) -> StoreResult<u64>;
}

#[async_trait]
impl Store for Database {
    async fn upsert_destination_languages(
        &self,
        guild_id: &str,
        channel_id: &str,
        languages: &[Language],
    ) -> StoreResult<Vec<Destination>> {
        Database::upsert_destination_languages(self, guild_id, channel_id, languages).await
    }

    async fn list_destinations_for_language(
        &self,
        language: Language,
    ) -> StoreResult<Vec<Destination>> {
        Database::list_destinations_for_language(self, language).await
    }

    async fn list_destinations_for_guild(&self, guild_id: &str) -> StoreResult<Vec<Destination>> {
        Database::list_destinations_for_guild(self, guild_id).await
    }

    async fn list_all_destinations(&self) -> StoreResult<Vec<Destination>> {
        Database::list_all_destinations(self).await
    }

    async fn delete_destination(&self, guild_id: &str) -> StoreResult<u64> {
        Database::delete_destination(self, guild_id).await
    }

    async fn delete_destination_language(
        &self,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<u64> {
        Database::delete_destination_language(self, guild_id, language).await
    }

    async fn has_delivery(&self, article_url: &str, guild_id: &str) -> StoreResult<bool> {
        Database::has_delivery(self, article_url, guild_id).await
    }

    async fn record_delivery(
        &self,
        article_url: &str,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<RecordOutcome> {
        Database::record_delivery(self, article_url, guild_id, language).await
    }

    async fn count_deliveries(&self, guild_id: &str) -> StoreResult<i64> {
        Database::count_deliveries(self, guild_id).await
    }

    async fn recent_deliveries(
        &self,
        guild_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        Database::recent_deliveries(self, guild_id, limit).await
    }

    async fn purge_deliveries_older_than(&self, age: Duration) -> StoreResult<u64> {
        Database::purge_deliveries_older_than(self, age).await
    }
}
