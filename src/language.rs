//! Supported feed locales.
//!
//! Every monitored feed belongs to exactly one [`Language`]. The language is
//! decided by which feed produced an item, never by the item's content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sentinel category used when a feed item carries none.
pub const UNCATEGORIZED: &str = "未分類";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown language '{0}' (expected one of: zh-tw, ja, en)")]
pub struct UnknownLanguage(pub String);

/// A content locale with its own canonical feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "zh-tw")]
    ZhTw,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "en")]
    En,
}

impl Language {
    /// All languages in display order.
    pub const ALL: [Language; 3] = [Language::ZhTw, Language::Ja, Language::En];

    /// Short code used in storage, configuration and the operator surface.
    pub fn code(self) -> &'static str {
        match self {
            Language::ZhTw => "zh-tw",
            Language::Ja => "ja",
            Language::En => "en",
        }
    }

    /// Human-readable name in the language itself.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::ZhTw => "繁體中文",
            Language::Ja => "日本語",
            Language::En => "English",
        }
    }

    /// Canonical feed URL for this language.
    pub fn feed_url(self) -> &'static str {
        match self {
            Language::ZhTw => "https://www.pixivision.net/zh-tw/rss",
            Language::Ja => "https://www.pixivision.net/ja/rss",
            Language::En => "https://www.pixivision.net/en/rss",
        }
    }

    /// Accent color applied to rendered messages.
    pub fn accent_color(self) -> u32 {
        match self {
            Language::ZhTw => 0xE74C3C,
            Language::Ja => 0x3498DB,
            Language::En => 0x2ECC71,
        }
    }

    /// Flag badge shown next to the display name.
    pub fn badge(self) -> &'static str {
        match self {
            Language::ZhTw => "🇹🇼",
            Language::Ja => "🇯🇵",
            Language::En => "🇬🇧",
        }
    }

    /// Infers the language from a canonical feed URL by its locale path segment.
    ///
    /// Returns `None` for URLs that carry no recognised segment; feeds with
    /// such URLs must have their language assigned by configuration.
    pub fn from_feed_url(url: &str) -> Option<Language> {
        Language::ALL
            .into_iter()
            .find(|lang| url.contains(&format!("/{}/", lang.code())))
    }

    /// Parses a comma-separated list (`"zh-tw, ja"`), or `all`.
    ///
    /// Duplicates are collapsed while keeping first-seen order. Empty input
    /// yields an empty list; the caller decides whether that is acceptable.
    pub fn parse_list(input: &str) -> Result<Vec<Language>, UnknownLanguage> {
        if input.trim().eq_ignore_ascii_case("all") {
            return Ok(Language::ALL.to_vec());
        }

        let mut out = Vec::new();
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let lang: Language = part.parse()?;
            if !out.contains(&lang) {
                out.push(lang);
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh-tw" => Ok(Language::ZhTw),
            "ja" => Ok(Language::Ja),
            "en" => Ok(Language::En),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}
