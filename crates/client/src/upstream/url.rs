//! Upstream URL handling.

/// Error type for upstream base URL parsing failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse the configured upstream base URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http or https scheme
/// 3. Remove fragment (#...)
/// 4. Keep path and query string intact
pub fn parse_base(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Join two path fragments with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Build the upstream target for an inbound path and query.
///
/// The inbound path is appended to the base path and the base query, when
/// present, is placed ahead of the inbound query.
pub fn join_target(base: &url::Url, path: &str, query: Option<&str>) -> url::Url {
    let mut target = base.clone();
    target.set_path(&single_joining_slash(base.path(), path));

    let base_query = base.query().filter(|q| !q.is_empty());
    let query = query.filter(|q| !q.is_empty());
    let merged = match (base_query, query) {
        (Some(a), Some(b)) => Some(format!("{a}&{b}")),
        (a, b) => a.or(b).map(str::to_string),
    };
    target.set_query(merged.as_deref());

    target
}
