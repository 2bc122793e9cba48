use super::schema::Database;
use super::types::{collect_destinations, DestinationRow, StoreResult};
use crate::language::Language;
use crate::model::Destination;

impl Database {
    // ========================================================================
    // Destination Operations
    // ========================================================================

    /// Routes each of `languages` for `guild_id` to `channel_id` (UPSERT).
    ///
    /// One row per language; an existing row for the same `(guild, language)`
    /// keeps its `created_at` and gets the new channel. Languages not listed
    /// are left untouched. Safe against a concurrent writer upserting the same
    /// guild: the primary key resolves the race.
    ///
    /// # Returns
    ///
    /// The guild's rows for the requested languages after the write.
    pub async fn upsert_destination_languages(
        &self,
        guild_id: &str,
        channel_id: &str,
        languages: &[Language],
    ) -> StoreResult<Vec<Destination>> {
        if languages.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for language in languages {
            sqlx::query(
                r#"
                INSERT INTO destinations (guild_id, language, channel_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(guild_id, language) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    updated_at = excluded.updated_at
            "#,
            )
            .bind(guild_id)
            .bind(language.code())
            .bind(channel_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut rows = self.list_destinations_for_guild(guild_id).await?;
        rows.retain(|d| languages.contains(&d.language));
        Ok(rows)
    }

    /// All destinations subscribed to `language`, ordered by guild.
    pub async fn list_destinations_for_language(
        &self,
        language: Language,
    ) -> StoreResult<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationRow>(
            r#"
            SELECT guild_id, language, channel_id, created_at, updated_at
            FROM destinations
            WHERE language = ?
            ORDER BY guild_id
        "#,
        )
        .bind(language.code())
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_destinations(rows))
    }

    /// Every language row configured for one guild.
    pub async fn list_destinations_for_guild(&self, guild_id: &str) -> StoreResult<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationRow>(
            r#"
            SELECT guild_id, language, channel_id, created_at, updated_at
            FROM destinations
            WHERE guild_id = ?
            ORDER BY language
        "#,
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_destinations(rows))
    }

    /// All destinations regardless of language.
    pub async fn list_all_destinations(&self) -> StoreResult<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationRow>(
            r#"
            SELECT guild_id, language, channel_id, created_at, updated_at
            FROM destinations
            ORDER BY guild_id, language
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(collect_destinations(rows))
    }

    /// Removes every language row of a guild. Returns the rows removed.
    pub async fn delete_destination(&self, guild_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM destinations WHERE guild_id = ?")
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes one `(guild, language)` row. Returns the rows removed (0 or 1).
    pub async fn delete_destination_language(
        &self,
        guild_id: &str,
        language: Language,
    ) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM destinations WHERE guild_id = ? AND language = ?")
            .bind(guild_id)
            .bind(language.code())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
