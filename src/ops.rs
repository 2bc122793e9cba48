//! Operator operations behind the CLI subcommands.
//!
//! Every operation returns a small report or an [`OpsError`] whose message
//! is fit to show an operator; internal error detail goes to the log.

use std::time::Duration;
use thiserror::Error;

use crate::delivery::{DeliveryEngine, DeliveryError};
use crate::feed::{fetch_recent, FeedSource, FetchOptions};
use crate::language::Language;
use crate::model::{DeliveryRecord, Destination};
use crate::storage::{Store, StoreError};

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("{0}")]
    InvalidLanguages(String),

    #[error("No languages selected")]
    NoLanguages,

    #[error("No feed configured for language {0}")]
    NoFeed(Language),

    #[error("Channel {0} is not available for posting")]
    ChannelUnavailable(String),

    #[error("No articles could be fetched")]
    NoArticles,

    #[error("Storage is unavailable, check the logs for details")]
    Store(#[source] StoreError),
}

impl From<StoreError> for OpsError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Store operation failed");
        OpsError::Store(e)
    }
}

/// Parses an operator-supplied language list (`"ja,en"` or `"all"`).
///
/// Empty or unknown input is rejected.
pub fn parse_languages(input: &str) -> Result<Vec<Language>, OpsError> {
    let languages =
        Language::parse_list(input).map_err(|e| OpsError::InvalidLanguages(e.to_string()))?;
    if languages.is_empty() {
        return Err(OpsError::NoLanguages);
    }
    Ok(languages)
}

// ============================================================================
// Configure / Unconfigure
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReport {
    pub guild_id: String,
    pub channel_id: String,
    pub languages: Vec<Language>,
}

impl ConfigureReport {
    /// Display names joined for an operator message.
    pub fn language_names(&self) -> String {
        self.languages
            .iter()
            .map(|l| l.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Routes `languages` of `guild_id` to `channel_id`.
pub async fn configure(
    store: &dyn Store,
    guild_id: &str,
    channel_id: &str,
    languages: &[Language],
) -> Result<ConfigureReport, OpsError> {
    if languages.is_empty() {
        return Err(OpsError::NoLanguages);
    }

    let rows = store
        .upsert_destination_languages(guild_id, channel_id, languages)
        .await?;

    tracing::info!(
        guild_id = %guild_id,
        channel_id = %channel_id,
        languages = rows.len(),
        "Destination configured"
    );

    Ok(ConfigureReport {
        guild_id: guild_id.to_string(),
        channel_id: channel_id.to_string(),
        languages: rows.into_iter().map(|d| d.language).collect(),
    })
}

/// Removes one language subscription of a guild, or all of them.
///
/// Returns the number of subscriptions removed.
pub async fn unconfigure(
    store: &dyn Store,
    guild_id: &str,
    language: Option<Language>,
) -> Result<u64, OpsError> {
    let removed = match language {
        Some(lang) => store.delete_destination_language(guild_id, lang).await?,
        None => store.delete_destination(guild_id).await?,
    };
    tracing::info!(guild_id = %guild_id, removed = removed, "Destination unconfigured");
    Ok(removed)
}

// ============================================================================
// Resend
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResendRequest {
    pub channel_id: String,
    pub languages: Vec<Language>,
    /// Articles per language; `None` sends everything one fetch returns
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResendReport {
    /// Articles fetched across all requested languages
    pub articles: usize,
    pub sent: usize,
}

/// Fetches the most recent articles per language and sends each to the
/// requested channel, bypassing subscriptions and delivery records.
///
/// A language whose fetch fails is logged and skipped.
///
/// # Errors
///
/// [`OpsError::ChannelUnavailable`] if the channel cannot be resolved or
/// posted to, [`OpsError::NoArticles`] if nothing was fetched at all.
pub async fn resend(
    engine: &DeliveryEngine,
    client: &reqwest::Client,
    sources: &[FeedSource],
    options: &FetchOptions,
    request: &ResendRequest,
) -> Result<ResendReport, OpsError> {
    if request.languages.is_empty() {
        return Err(OpsError::NoLanguages);
    }

    let mut report = ResendReport::default();

    for &language in &request.languages {
        let source = sources
            .iter()
            .find(|s| s.language == language)
            .ok_or(OpsError::NoFeed(language))?;

        let articles =
            match fetch_recent(client, &source.url, language, request.count, options).await {
                Ok(articles) => articles,
                Err(e) => {
                    tracing::warn!(
                        language = %language,
                        feed = %source.url,
                        error = %e,
                        "Resend fetch failed, skipping language"
                    );
                    continue;
                }
            };
        report.articles += articles.len();

        for article in &articles {
            match engine.deliver_on_demand(&request.channel_id, article).await {
                Ok(()) => report.sent += 1,
                Err(e @ (DeliveryError::Resolve { .. } | DeliveryError::NotSendable { .. })) => {
                    tracing::warn!(channel_id = %request.channel_id, error = %e, "Resend target unavailable");
                    return Err(OpsError::ChannelUnavailable(request.channel_id.clone()));
                }
                Err(e) => {
                    tracing::warn!(
                        channel_id = %request.channel_id,
                        url = %article.url,
                        error = %e,
                        "Resend of article failed"
                    );
                }
            }
        }
    }

    if report.articles == 0 {
        return Err(OpsError::NoArticles);
    }

    tracing::info!(
        channel_id = %request.channel_id,
        articles = report.articles,
        sent = report.sent,
        "Resend complete"
    );
    Ok(report)
}

// ============================================================================
// Status / Purge
// ============================================================================

/// Delivery records shown by [`status`].
pub const STATUS_RECENT_LIMIT: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildStatus {
    pub destinations: Vec<Destination>,
    pub deliveries: i64,
    /// Newest first, at most [`STATUS_RECENT_LIMIT`]
    pub recent: Vec<DeliveryRecord>,
}

impl GuildStatus {
    pub fn is_configured(&self) -> bool {
        !self.destinations.is_empty()
    }
}

pub async fn status(store: &dyn Store, guild_id: &str) -> Result<GuildStatus, OpsError> {
    let destinations = store.list_destinations_for_guild(guild_id).await?;
    let deliveries = store.count_deliveries(guild_id).await?;
    let recent = store
        .recent_deliveries(guild_id, STATUS_RECENT_LIMIT)
        .await?;
    Ok(GuildStatus {
        destinations,
        deliveries,
        recent,
    })
}

/// Every configured destination, for an operator overview.
pub async fn list_destinations(store: &dyn Store) -> Result<Vec<Destination>, OpsError> {
    Ok(store.list_all_destinations().await?)
}

/// Deletes delivery records older than `age`. Returns the rows deleted.
pub async fn purge(store: &dyn Store, age: Duration) -> Result<u64, OpsError> {
    Ok(store.purge_deliveries_older_than(age).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_languages() {
        assert_eq!(parse_languages("all").unwrap(), Language::ALL.to_vec());
        assert_eq!(
            parse_languages("EN, ja, en").unwrap(),
            vec![Language::En, Language::Ja]
        );
        assert!(matches!(parse_languages(" , "), Err(OpsError::NoLanguages)));
        match parse_languages("ja,fr") {
            Err(OpsError::InvalidLanguages(msg)) => assert!(msg.contains("fr")),
            other => panic!("Expected InvalidLanguages, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_configure_then_status() {
        let db = Database::open(":memory:").await.unwrap();

        let report = configure(&db, "g1", "c1", &[Language::ZhTw, Language::En])
            .await
            .unwrap();
        assert_eq!(report.languages, vec![Language::En, Language::ZhTw]);
        assert_eq!(report.language_names(), "English, 繁體中文");

        let status = status(&db, "g1").await.unwrap();
        assert!(status.is_configured());
        assert_eq!(status.destinations.len(), 2);
        assert_eq!(status.deliveries, 0);
        assert!(status.recent.is_empty());
    }

    #[tokio::test]
    async fn test_status_shows_recent_deliveries() {
        let db = Database::open(":memory:").await.unwrap();
        configure(&db, "g1", "c1", &[Language::Ja]).await.unwrap();
        for i in 0..7 {
            db.record_delivery_at(&format!("https://x/{i}"), "g1", Language::Ja, i)
                .await
                .unwrap();
        }

        let status = status(&db, "g1").await.unwrap();
        assert_eq!(status.deliveries, 7);
        assert_eq!(status.recent.len(), STATUS_RECENT_LIMIT as usize);
        assert_eq!(status.recent[0].article_url, "https://x/6");
    }

    #[tokio::test]
    async fn test_list_destinations_across_guilds() {
        let db = Database::open(":memory:").await.unwrap();
        configure(&db, "g1", "c1", &[Language::Ja]).await.unwrap();
        configure(&db, "g2", "c2", &[Language::En, Language::Ja])
            .await
            .unwrap();
        assert_eq!(list_destinations(&db).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_configure_rejects_empty_languages() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(matches!(
            configure(&db, "g1", "c1", &[]).await,
            Err(OpsError::NoLanguages)
        ));
    }

    #[tokio::test]
    async fn test_unconfigure_one_or_all() {
        let db = Database::open(":memory:").await.unwrap();
        configure(&db, "g1", "c1", &Language::ALL).await.unwrap();

        assert_eq!(unconfigure(&db, "g1", Some(Language::Ja)).await.unwrap(), 1);
        assert_eq!(unconfigure(&db, "g1", None).await.unwrap(), 2);
        assert!(!status(&db, "g1").await.unwrap().is_configured());
    }

    #[tokio::test]
    async fn test_purge_on_fresh_store() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(purge(&db, Duration::from_secs(60)).await.unwrap(), 0);
    }
}
