//! Presenter: turns an [`Article`] into a chat message.

use serde::Serialize;

use crate::model::Article;
use crate::util::truncate_chars;

/// Maximum description length in characters, ellipsis included.
pub const DESCRIPTION_LIMIT: usize = 300;

/// Chat embed title limit in characters.
const TITLE_LIMIT: usize = 256;

/// A message ready for [`crate::sender::Sender::send`].
///
/// Serializes to the chat platform's create-message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub color: u32,
    /// RFC 3339
    pub timestamp: String,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub author: EmbedAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
}

pub trait Presenter: Send + Sync {
    fn render(&self, article: &Article) -> RenderedMessage;
}

/// Renders one embed per article, accented by the article's language.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbedPresenter;

impl Presenter for EmbedPresenter {
    fn render(&self, article: &Article) -> RenderedMessage {
        let lang = article.language;
        let image = (!article.image_url.is_empty()).then(|| EmbedImage {
            url: article.image_url.clone(),
        });

        let embed = Embed {
            title: truncate_chars(&article.title, TITLE_LIMIT).into_owned(),
            url: article.url.clone(),
            description: truncate_chars(&article.description, DESCRIPTION_LIMIT).into_owned(),
            color: lang.accent_color(),
            timestamp: article.published_at.to_rfc3339(),
            footer: EmbedFooter {
                text: format!("Pixivision {} • {}", lang.display_name(), article.category),
            },
            image,
            author: EmbedAuthor {
                name: format!("{} {}", lang.badge(), lang.display_name()),
                url: article.url.clone(),
            },
        };

        RenderedMessage {
            embeds: vec![embed],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{Language, UNCATEGORIZED};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn article(language: Language) -> Article {
        Article {
            title: "Cats".into(),
            url: "https://www.pixivision.net/ja/a/1".into(),
            description: "Short".into(),
            category: UNCATEGORIZED.into(),
            image_url: String::new(),
            language,
            published_at: Utc.with_ymd_and_hms(2025, 10, 14, 1, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_fields() {
        let message = EmbedPresenter.render(&article(Language::Ja));
        let embed = &message.embeds[0];

        assert_eq!(embed.color, 0x3498DB);
        assert_eq!(embed.footer.text, "Pixivision 日本語 • 未分類");
        assert_eq!(embed.author.name, "🇯🇵 日本語");
        assert_eq!(embed.author.url, embed.url);
        assert_eq!(embed.timestamp, "2025-10-14T01:00:00+00:00");
        assert!(embed.image.is_none());
    }

    #[test]
    fn test_description_truncated_to_limit() {
        let mut long = article(Language::En);
        long.description = "あ".repeat(400);
        let embed = &EmbedPresenter.render(&long).embeds[0];

        assert_eq!(embed.description.chars().count(), DESCRIPTION_LIMIT);
        assert!(embed.description.ends_with("..."));

        let mut exact = article(Language::En);
        exact.description = "x".repeat(DESCRIPTION_LIMIT);
        assert_eq!(
            EmbedPresenter.render(&exact).embeds[0].description,
            exact.description
        );
    }

    #[test]
    fn test_accent_differs_per_language() {
        let colors: Vec<u32> = Language::ALL
            .iter()
            .map(|&l| EmbedPresenter.render(&article(l)).embeds[0].color)
            .collect();
        assert_eq!(colors, vec![0xE74C3C, 0x3498DB, 0x2ECC71]);
    }

    #[test]
    fn test_image_serialized_only_when_present() {
        let plain = serde_json::to_value(EmbedPresenter.render(&article(Language::En))).unwrap();
        assert!(plain["embeds"][0].get("image").is_none());

        let mut with_image = article(Language::En);
        with_image.image_url = "https://i.pximg.net/1.jpg".into();
        let json = serde_json::to_value(EmbedPresenter.render(&with_image)).unwrap();
        assert_eq!(json["embeds"][0]["image"]["url"], "https://i.pximg.net/1.jpg");
    }
}
