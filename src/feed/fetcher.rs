use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::normalize::normalize;
use super::raw::parse_feed;
use crate::language::Language;
use crate::model::Article;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and reading a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The feed was read but yielded no usable articles
    #[error("No articles found in feed")]
    NoArticles,
}

/// Per-request fetch behavior.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Hard limit on one HTTP attempt
    pub timeout: Duration,
    /// Retries for 429, 5xx and truncated bodies within one fetch
    pub max_retries: u32,
    /// First backoff delay; doubles per retry
    pub retry_base_delay: Duration,
    pub max_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            max_bytes: MAX_FEED_SIZE,
        }
    }
}

/// Articles read from one feed snapshot, in feed order.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub articles: Vec<Article>,
    /// Items dropped because they carried no usable link
    pub skipped: usize,
}

/// Fetches `url`, parses it and normalizes every item as `language`.
///
/// Items without a usable link are dropped and counted in
/// [`FeedSnapshot::skipped`]. An empty feed is a successful, empty snapshot.
///
/// # Errors
///
/// - [`FetchError::Network`] / [`FetchError::Timeout`] - transport failure
/// - [`FetchError::HttpStatus`] - 4xx, or 5xx after retries
/// - [`FetchError::RateLimited`] - 429 after retries
/// - [`FetchError::ResponseTooLarge`] - body over `options.max_bytes`
/// - [`FetchError::Parse`] - not RSS/Atom XML
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    url: &str,
    language: Language,
    options: &FetchOptions,
) -> Result<FeedSnapshot, FetchError> {
    let bytes = fetch_bytes(client, url, options).await?;
    let feed = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let total = feed.items.len();
    let articles: Vec<Article> = feed
        .items
        .iter()
        .map(|raw| normalize(raw, language))
        .filter(|article| !article.url.is_empty())
        .collect();

    let skipped = total - articles.len();
    if skipped > 0 {
        tracing::warn!(feed = %url, skipped = skipped, "Feed items without a link skipped");
    }

    Ok(FeedSnapshot { articles, skipped })
}

/// GETs the feed body with retries for 429, 5xx and truncated downloads.
///
/// 4xx responses fail immediately. Backoff is `retry_base_delay * 2^n`.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let mut retry_count: u32 = 0;

    loop {
        let response = tokio::time::timeout(options.timeout, client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        let delay = options
            .retry_base_delay
            .saturating_mul(2u32.saturating_pow(retry_count));

        // EDGE-004: Handle rate limiting with exponential backoff
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= options.max_retries {
                return Err(FetchError::RateLimited(options.max_retries));
            }
            tracing::warn!(
                feed = %url,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if status.is_server_error() {
            if retry_count >= options.max_retries {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            tracing::warn!(
                feed = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, options.max_bytes).await {
            Ok(bytes) => return Ok(bytes),
            Err(FetchError::IncompleteResponse { expected, received }) => {
                // EDGE-005: Truncated download, retry with backoff
                if retry_count >= options.max_retries {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if usize::try_from(len).map_or(true, |len| len > limit) {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title><link>https://www.pixivision.net/en/a/1</link></item>
    <item><title>No link</title></item>
</channel></rss>"#;

    fn fast_options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
            max_bytes: MAX_FEED_SIZE,
        }
    }

    #[tokio::test]
    async fn test_snapshot_success_skips_linkless_items() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/en/rss", mock_server.uri());
        let snapshot = fetch_snapshot(&client, &url, Language::En, &fast_options())
            .await
            .unwrap();

        assert_eq!(snapshot.articles.len(), 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.articles[0].title, "Test");
        assert_eq!(snapshot.articles[0].language, Language::En);
    }

    #[tokio::test]
    async fn test_404_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_bytes(&client, &mock_server.uri(), &fast_options()).await;
        match result {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_bytes(&client, &mock_server.uri(), &fast_options()).await;
        match result {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        // First two requests return 503, third succeeds
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let snapshot = fetch_snapshot(&client, &mock_server.uri(), Language::Ja, &fast_options())
            .await
            .unwrap();
        assert_eq!(snapshot.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_429_exhausts_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let options = FetchOptions {
            max_retries: 1,
            ..fast_options()
        };
        let result = fetch_bytes(&client, &mock_server.uri(), &options).await;
        assert!(matches!(result, Err(FetchError::RateLimited(1))));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let options = FetchOptions {
            max_bytes: 1024,
            ..fast_options()
        };
        let result = fetch_bytes(&client, &mock_server.uri(), &options).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_snapshot(&client, &mock_server.uri(), Language::En, &fast_options()).await;
        match result {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_feed_success() {
        let empty_rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel></channel></rss>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rss))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let snapshot =
            fetch_snapshot(&client, &mock_server.uri(), Language::En, &fast_options())
                .await
                .unwrap();
        assert!(snapshot.articles.is_empty());
        assert_eq!(snapshot.skipped, 0);
    }
}
