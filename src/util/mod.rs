//! Utility functions for common operations.
//!
//! - **Text processing**: markup stripping, entity decoding and
//!   character-aware truncation for feed-provided text
//! - **URL validation**: absolute http(s) checks for feed links and endpoints
//!
//! # Examples
//!
//! ```
//! use feedrelay::util::{clean_text, truncate_chars, validate_http_url};
//!
//! assert_eq!(clean_text("<p>Hello&nbsp;world</p>"), "Hello world");
//! assert_eq!(truncate_chars("Long article title", 10), "Long ar...");
//! assert!(validate_http_url("https://example.com/feed.xml").is_ok());
//! ```

mod text;
mod url_validator;

pub use url_validator::{is_absolute_http_url, validate_http_url, UrlValidationError};
pub use text::{clean_text, decode_entities, strip_control_chars, strip_tags, truncate_chars};
