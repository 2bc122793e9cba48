use std::time::Duration;

use super::schema::Database;
use super::types::{StoreError, StoreResult};
use crate::language::Language;
use crate::model::{DeliveryRecord, RecordOutcome};

/// Default retention for delivery records.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

impl Database {
    // ========================================================================
    // Delivery Record Operations
    // ========================================================================

    /// True if `article_url` was already delivered to `guild_id`.
    pub async fn has_delivery(&self, article_url: &str, guild_id: &str) -> StoreResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM deliveries WHERE article_url = ? AND guild_id = ?")
                .bind(article_url)
                .bind(guild_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    /// Records a delivery stamped with the current time.
    ///
    /// Calling twice for the same `(article_url, guild_id)` returns
    /// [`RecordOutcome::AlreadyRecorded`] and leaves the first record as is.
    pub async fn record_delivery(
        &self,
        article_url: &str,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<RecordOutcome> {
        let now = chrono::Utc::now().timestamp();
        self.record_delivery_at(article_url, guild_id, language, now)
            .await
    }

    pub(crate) async fn record_delivery_at(
        &self,
        article_url: &str,
        guild_id: &str,
        language: Language,
        posted_at: i64,
    ) -> StoreResult<RecordOutcome> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO deliveries (article_url, guild_id, language, posted_at)
            VALUES (?, ?, ?, ?)
        "#,
        )
        .bind(article_url)
        .bind(guild_id)
        .bind(language.code())
        .bind(posted_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyRecorded)
        } else {
            Ok(RecordOutcome::Recorded)
        }
    }

    /// Number of deliveries recorded for a guild.
    pub async fn count_deliveries(&self, guild_id: &str) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deliveries WHERE guild_id = ?")
            .bind(guild_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recent deliveries for a guild, newest first.
    pub async fn recent_deliveries(
        &self,
        guild_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT article_url, guild_id, language, posted_at
            FROM deliveries
            WHERE guild_id = ?
            ORDER BY posted_at DESC, id DESC
            LIMIT ?
        "#,
        )
        .bind(guild_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(article_url, guild_id, language, posted_at)| -> StoreResult<DeliveryRecord> {
                let language = language.parse::<Language>().map_err(|e| StoreError::CorruptRow {
                    table: "deliveries",
                    reason: format!("{e}"),
                })?;
                Ok(DeliveryRecord {
                    article_url,
                    guild_id,
                    language,
                    posted_at,
                })
            })
            .collect()
    }

    /// Retention sweep: deletes records posted more than `age` ago.
    ///
    /// Returns the number of records deleted.
    pub async fn purge_deliveries_older_than(&self, age: Duration) -> StoreResult<u64> {
        let age_secs = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = chrono::Utc::now().timestamp().saturating_sub(age_secs);
        self.purge_deliveries_before(cutoff).await
    }

    pub(crate) async fn purge_deliveries_before(&self, cutoff: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM deliveries WHERE posted_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted = deleted, cutoff = cutoff, "Purged old delivery records");
        }
        Ok(deleted)
    }
}
