use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Parses an absolute http(s) URL.
///
/// Used for operator-supplied endpoints (feed overrides, chat API base) and
/// for deciding whether a feed item's link can serve as its identity key.
///
/// # Examples
///
/// ```
/// use feedrelay::util::validate_http_url;
///
/// assert!(validate_http_url("https://www.pixivision.net/en/rss").is_ok());
/// assert!(validate_http_url("file:///etc/passwd").is_err());
/// assert!(validate_http_url("/relative/path").is_err());
/// ```
pub fn validate_http_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// True when `s` is an absolute http(s) URL.
pub fn is_absolute_http_url(s: &str) -> bool {
    validate_http_url(s).is_ok()
}
