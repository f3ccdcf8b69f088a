//! URL canonicalization for cache keys and manifest resolution.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse a URL handed to the worker from outside (tool calls).
///
/// Defaults the scheme to `https://`, accepts only http(s), drops the
/// fragment and keeps the query string as given. Hosts come back lowercased
/// from the `url` parser.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let with_scheme = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = url::Url::parse(&with_scheme).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Blob cache key for a URL: the absolute URL without its fragment.
pub fn cache_key(url: &url::Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.into()
}

/// Resolve a manifest entry (e.g. `./index.html`) against the app origin.
pub fn resolve(origin: &url::Url, entry: &str) -> Result<url::Url, UrlError> {
    if entry.trim().is_empty() {
        return Err(UrlError::Empty);
    }
    let mut resolved = origin.join(entry.trim()).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    resolved.set_fragment(None);
    Ok(resolved)
}
