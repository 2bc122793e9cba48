use chrono::{DateTime, Utc};

use crate::language::Language;

// ============================================================================
// Data Structures
// ============================================================================

/// A normalized feed article.
///
/// Built once per raw feed item and never mutated afterwards. Only `url` is
/// ever persisted, as part of a [`DeliveryRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Plain text, markup stripped and entities decoded
    pub title: String,
    /// Absolute link, the article's identity key
    pub url: String,
    pub description: String,
    /// Feed category, or [`crate::language::UNCATEGORIZED`]
    pub category: String,
    /// Absolute image URL, empty when the item has none
    pub image_url: String,
    pub language: Language,
    pub published_at: DateTime<Utc>,
}

/// One routed subscription: a guild's channel for a single language.
///
/// A guild subscribed to several languages has one `Destination` per
/// language; at most one exists per `(guild_id, language)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub guild_id: String,
    pub channel_id: String,
    pub language: Language,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Proof that an article was delivered to a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub article_url: String,
    pub guild_id: String,
    pub language: Language,
    /// Unix seconds
    pub posted_at: i64,
}

/// Result of writing a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A record for `(article_url, guild_id)` already existed
    AlreadyRecorded,
}
