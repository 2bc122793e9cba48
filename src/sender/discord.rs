use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::{Channel, ChannelKind, SendError, Sender};
use crate::present::RenderedMessage;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Platform error code for a deleted or inaccessible channel id.
const UNKNOWN_CHANNEL: u64 = 10003;

/// Retries after a 429 on message creation.
const MAX_RATE_LIMIT_RETRIES: u32 = 2;
/// Longest `retry_after` honored before giving up.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// [`Sender`] over the chat platform's REST API with a bot token.
pub struct DiscordSender {
    client: reqwest::Client,
    api_base: String,
    token: SecretString,
}

impl std::fmt::Debug for DiscordSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSender")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ChannelBody {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<u64>,
    #[serde(default)]
    message: String,
    /// Seconds, only on 429
    retry_after: Option<f64>,
}

impl DiscordSender {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, token: SecretString) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    fn channel_url(&self, channel_id: &str, suffix: &str) -> Result<String, SendError> {
        // Snowflakes are decimal; anything else would be spliced into the path
        if channel_id.is_empty() || !channel_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SendError::InvalidChannelId(channel_id.to_string()));
        }
        Ok(format!("{}/channels/{}{}", self.api_base, channel_id, suffix))
    }
}

/// Maps a non-2xx response to a [`SendError`].
async fn classify_failure(channel_id: &str, response: reqwest::Response) -> SendError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();

    // Only the platform's own error body proves the channel is gone; a bare
    // 404 may come from a wrong API base or a proxy
    if body.code == Some(UNKNOWN_CHANNEL) {
        return SendError::Gone {
            channel_id: channel_id.to_string(),
        };
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return SendError::RateLimited;
    }
    SendError::Api {
        status: status.as_u16(),
        code: body.code,
        message: body.message,
    }
}

#[async_trait]
impl Sender for DiscordSender {
    async fn resolve_channel(&self, channel_id: &str) -> Result<Channel, SendError> {
        let url = self.channel_url(channel_id, "")?;
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(channel_id, response).await);
        }

        let body: ChannelBody = response.json().await?;
        Ok(Channel {
            id: body.id,
            kind: ChannelKind::from_type_code(body.kind),
        })
    }

    async fn send(&self, channel: &Channel, message: &RenderedMessage) -> Result<(), SendError> {
        if !channel.is_sendable() {
            return Err(SendError::NotSendable {
                channel_id: channel.id.clone(),
                kind: channel.kind,
            });
        }

        let url = self.channel_url(&channel.id, "/messages")?;
        let mut retry_count = 0;

        loop {
            let response = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .json(message)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && retry_count < MAX_RATE_LIMIT_RETRIES {
                let body: ErrorBody = response.json().await.unwrap_or_default();
                let wait = match body.retry_after.map(Duration::try_from_secs_f64) {
                    None => Duration::from_secs(1),
                    Some(Ok(wait)) if wait <= MAX_RETRY_AFTER => wait,
                    Some(_) => return Err(SendError::RateLimited),
                };
                tracing::warn!(
                    channel_id = %channel.id,
                    retry = retry_count,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited by chat platform, backing off"
                );
                tokio::time::sleep(wait).await;
                retry_count += 1;
                continue;
            }

            return Err(classify_failure(&channel.id, response).await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::{Embed, EmbedAuthor, EmbedFooter};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender(server: &MockServer) -> DiscordSender {
        DiscordSender::new(
            reqwest::Client::new(),
            format!("{}/api/v10/", server.uri()),
            SecretString::from("test-token".to_string()),
        )
    }

    fn message() -> RenderedMessage {
        RenderedMessage {
            embeds: vec![Embed {
                title: "Cats".into(),
                url: "https://www.pixivision.net/en/a/1".into(),
                description: String::new(),
                color: 0x2ECC71,
                timestamp: "2025-10-14T01:00:00+00:00".into(),
                footer: EmbedFooter {
                    text: "Pixivision English • 未分類".into(),
                },
                image: None,
                author: EmbedAuthor {
                    name: "🇬🇧 English".into(),
                    url: "https://www.pixivision.net/en/a/1".into(),
                },
            }],
        }
    }

    fn text_channel() -> Channel {
        Channel {
            id: "123".into(),
            kind: ChannelKind::Text,
        }
    }

    #[tokio::test]
    async fn test_resolve_text_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/123"))
            .and(header("authorization", "Bot test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "123", "type": 0})))
            .mount(&server)
            .await;

        let channel = sender(&server).resolve_channel("123").await.unwrap();
        assert_eq!(channel, text_channel());
        assert!(channel.is_sendable());
    }

    #[tokio::test]
    async fn test_resolve_unknown_channel_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"message": "Unknown Channel", "code": 10003})),
            )
            .mount(&server)
            .await;

        let err = sender(&server).resolve_channel("123").await.unwrap_err();
        assert!(err.is_gone());
    }

    #[tokio::test]
    async fn test_missing_access_is_not_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"message": "Missing Access", "code": 50001})),
            )
            .mount(&server)
            .await;

        let err = sender(&server).resolve_channel("123").await.unwrap_err();
        match err {
            SendError::Api { status, code, .. } => {
                assert_eq!(status, 403);
                assert_eq!(code, Some(50001));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_numeric_id_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = sender(&server).resolve_channel("../guilds/1").await.unwrap_err();
        assert!(matches!(err, SendError::InvalidChannelId(_)));
    }

    #[tokio::test]
    async fn test_send_posts_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v10/channels/123/messages"))
            .and(body_partial_json(json!({"embeds": [{"title": "Cats"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "999"})))
            .expect(1)
            .mount(&server)
            .await;

        sender(&server)
            .send(&text_channel(), &message())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_to_voice_channel_refused() {
        let server = MockServer::start().await;
        let voice = Channel {
            id: "123".into(),
            kind: ChannelKind::Other(2),
        };
        let err = sender(&server).send(&voice, &message()).await.unwrap_err();
        assert!(matches!(err, SendError::NotSendable { .. }));
    }

    #[tokio::test]
    async fn test_send_retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 0.01, "global": false})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "999"})))
            .mount(&server)
            .await;

        sender(&server)
            .send(&text_channel(), &message())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_with_huge_retry_after_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"message": "Slow down", "retry_after": 1e300})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sender = sender(&server);
        let err = tokio::spawn(async move { sender.send(&text_channel(), &message()).await })
            .await
            .expect("send must not panic")
            .unwrap_err();
        assert!(matches!(err, SendError::RateLimited));
    }

    #[tokio::test]
    async fn test_send_with_negative_retry_after_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": -1.0})))
            .expect(1)
            .mount(&server)
            .await;

        let err = sender(&server)
            .send(&text_channel(), &message())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::RateLimited));
    }

    #[tokio::test]
    async fn test_plain_404_is_not_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string("<html><body>Not Found</body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("404 page not found"))
            .mount(&server)
            .await;

        let sender = sender(&server);
        let err = sender.resolve_channel("123").await.unwrap_err();
        assert!(!err.is_gone());
        assert!(matches!(err, SendError::Api { status: 404, code: None, .. }));

        let err = sender.send(&text_channel(), &message()).await.unwrap_err();
        assert!(!err.is_gone());
    }

    #[tokio::test]
    async fn test_send_to_deleted_channel_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"message": "Unknown Channel", "code": 10003})),
            )
            .mount(&server)
            .await;

        let err = sender(&server)
            .send(&text_channel(), &message())
            .await
            .unwrap_err();
        assert!(err.is_gone());
    }

    #[test]
    fn test_debug_redacts_token() {
        let sender = DiscordSender::new(
            reqwest::Client::new(),
            DEFAULT_API_BASE,
            SecretString::from("super-secret".to_string()),
        );
        let debug = format!("{:?}", sender);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
