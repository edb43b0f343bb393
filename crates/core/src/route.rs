//! Route classification for inbound request paths.
//!
//! Matching is case-sensitive and anchored to the whole path. The purge family
//! also matches its sub-paths. The method never changes the class.

/// Behaviour selected for an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// `/indexes/{index}/search`
    CachedSearch,
    /// `/purge` and `/purge/...`
    Purge,
    /// Everything else, forwarded untouched.
    PassThrough,
}

/// Classify a request path.
pub fn classify(path: &str) -> RouteClass {
    if is_search_path(path) {
        RouteClass::CachedSearch
    } else if path == "/purge" || path.starts_with("/purge/") {
        RouteClass::Purge
    } else {
        RouteClass::PassThrough
    }
}

fn is_search_path(path: &str) -> bool {
    path.strip_prefix("/indexes/")
        .and_then(|rest| rest.strip_suffix("/search"))
        .is_some_and(|index| !index.is_empty() && !index.contains('/'))
}

/// Second path segment: the index of `/indexes/{index}/search` or the target of
/// `/purge/{index}`. `None` when the segment is absent or empty.
pub fn index_name(path: &str) -> Option<&str> {
    path.split('/').nth(2).filter(|segment| !segment.is_empty())
}
