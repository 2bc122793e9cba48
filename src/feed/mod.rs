//! Feed reading: from HTTP bytes to canonical [`Article`](crate::model::Article)s.
//!
//! - [`raw`] - Event-driven RSS/Atom reader producing [`RawItem`]s
//! - [`normalize`] - Precedence rules turning a [`RawItem`] into an article
//! - [`fetcher`] - HTTP retrieval with size limit and bounded retries
//! - [`poller`] - Periodic per-feed polling with new-item detection
//! - [`on_demand`] - One-shot fetch for manual resends
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), feedrelay::feed::FetchError> {
//! use feedrelay::feed::{fetch_recent, FetchOptions};
//! use feedrelay::language::Language;
//!
//! let client = reqwest::Client::new();
//! let lang = Language::Ja;
//! let latest = fetch_recent(&client, lang.feed_url(), lang, Some(3), &FetchOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod normalize;
pub mod on_demand;
pub mod poller;
pub mod raw;

pub use fetcher::{fetch_snapshot, FeedSnapshot, FetchError, FetchOptions};
pub use normalize::{extract_article_image_url, extract_article_url, normalize};
pub use on_demand::{fetch_recent, ON_DEMAND_TIMEOUT};
pub use poller::{FeedPoller, FeedSource, PollerConfig, SeenSet};
pub use raw::{parse_feed, FeedParseError, RawImage, RawItem, RawLink};
