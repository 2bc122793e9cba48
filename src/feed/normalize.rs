//! Article Normalizer: [`RawItem`] → [`Article`].
//!
//! Pure and infallible. Every field has a safe default; the only field the
//! caller must check is an empty `url`, which marks an item with no usable
//! identity.

use chrono::{DateTime, Utc};

use super::raw::{RawImage, RawItem, RawLink};
use crate::language::{Language, UNCATEGORIZED};
use crate::model::Article;
use crate::util::{clean_text, is_absolute_http_url};

/// Builds a canonical article from a raw item.
///
/// `language` comes from the feed the item was read from, never from the
/// item's content.
pub fn normalize(raw: &RawItem, language: Language) -> Article {
    normalize_at(raw, language, Utc::now())
}

/// [`normalize`] with an explicit fallback time for undated items.
pub fn normalize_at(raw: &RawItem, language: Language, now: DateTime<Utc>) -> Article {
    let title = clean_text(raw.title.as_deref().unwrap_or_default());
    let description = clean_text(
        raw.description
            .as_deref()
            .or(raw.content.as_deref())
            .unwrap_or_default(),
    );
    let category = raw
        .category
        .as_deref()
        .map(clean_text)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| UNCATEGORIZED.to_string());

    let published_at = raw
        .published
        .as_deref()
        .and_then(parse_feed_date)
        .or_else(|| raw.updated.as_deref().and_then(parse_feed_date))
        .unwrap_or(now);

    Article {
        title,
        url: extract_article_url(raw),
        description,
        category,
        image_url: extract_article_image_url(raw),
        language,
        published_at,
    }
}

/// The item's link, by precedence: Atom `href` (alternate or unqualified),
/// then RSS `<link>` text, then empty.
///
/// Relative or non-HTTP links are not usable as identity and are passed over.
pub fn extract_article_url(raw: &RawItem) -> String {
    let atom = raw.links.iter().find_map(|link| match link {
        RawLink::AtomHref { href, rel }
            if rel.as_deref().is_none_or(|r| r == "alternate") && is_absolute_http_url(href) =>
        {
            Some(href)
        }
        _ => None,
    });

    let rss = || {
        raw.links.iter().find_map(|link| match link {
            RawLink::Element(text) if is_absolute_http_url(text) => Some(text),
            _ => None,
        })
    };

    atom.or_else(rss)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// The item's image, by precedence: Atom nested `<image><url>`, then RSS
/// nested `<image><url>`, then a flat `<image>` value, then empty.
pub fn extract_article_image_url(raw: &RawItem) -> String {
    let pick = |want: fn(&RawImage) -> Option<&String>| {
        raw.images
            .iter()
            .filter_map(want)
            .find(|url| is_absolute_http_url(url))
    };

    pick(|img| match img {
        RawImage::AtomNested(u) => Some(u),
        _ => None,
    })
    .or_else(|| {
        pick(|img| match img {
            RawImage::RssNested(u) => Some(u),
            _ => None,
        })
    })
    .or_else(|| {
        pick(|img| match img {
            RawImage::Flat(u) => Some(u),
            _ => None,
        })
    })
    .map(|s| s.trim().to_string())
    .unwrap_or_default()
}

/// Parses RSS `pubDate` (RFC 2822) or Atom `published`/`updated` (RFC 3339).
pub fn parse_feed_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
