//! On-demand Fetcher: one-shot read of a feed for manual resends.
//!
//! Bypasses the poller's seen-set entirely. Bounded by a hard deadline; a
//! body still streaming at the deadline is parsed as far as it got.

use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

use super::fetcher::{FetchError, FetchOptions};
use super::normalize::normalize;
use super::raw::{parse_feed, parse_feed_prefix};
use crate::language::Language;
use crate::model::Article;

/// Hard limit for one on-demand fetch.
pub const ON_DEMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches the most recent articles of a feed, in feed order.
///
/// `limit` keeps only the first `limit` articles; `None` keeps all of them.
///
/// # Errors
///
/// [`FetchError::NoArticles`] when the feed (or the part of it received
/// before the deadline) holds no usable article, [`FetchError::Timeout`] when
/// no response arrived in time, and any transport/HTTP/parse error otherwise.
pub async fn fetch_recent(
    client: &reqwest::Client,
    url: &str,
    language: Language,
    limit: Option<usize>,
    options: &FetchOptions,
) -> Result<Vec<Article>, FetchError> {
    fetch_recent_within(client, url, language, limit, options, ON_DEMAND_TIMEOUT).await
}

/// [`fetch_recent`] with an explicit deadline.
pub async fn fetch_recent_within(
    client: &reqwest::Client,
    url: &str,
    language: Language,
    limit: Option<usize>,
    options: &FetchOptions,
    timeout: Duration,
) -> Result<Vec<Article>, FetchError> {
    let deadline = Instant::now() + timeout;

    let response = tokio::time::timeout_at(deadline, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited(0));
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let (bytes, complete) = read_until(response, options.max_bytes, deadline).await?;
    let feed = if complete {
        parse_feed(&bytes)
    } else {
        tracing::warn!(
            feed = %url,
            received = bytes.len(),
            "On-demand fetch hit its deadline, using partial feed"
        );
        parse_feed_prefix(&bytes)
    }
    .map_err(|e| FetchError::Parse(e.to_string()))?;

    let articles: Vec<Article> = feed
        .items
        .iter()
        .map(|raw| normalize(raw, language))
        .filter(|article| !article.url.is_empty())
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    if articles.is_empty() {
        return Err(FetchError::NoArticles);
    }
    Ok(articles)
}

/// Streams the body until it ends or `deadline` passes.
///
/// Returns the bytes read and whether the body was read to the end.
async fn read_until(
    response: reqwest::Response,
    limit: usize,
    deadline: Instant,
) -> Result<(Vec<u8>, bool), FetchError> {
    if let Some(len) = response.content_length() {
        if usize::try_from(len).map_or(true, |len| len > limit) {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    loop {
        let next = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Ok((bytes, false)),
        };
        let Some(chunk) = next else {
            return Ok((bytes, true));
        };
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
}
