//! Cache key derivation.

/// Build the cache key for a GET request.
///
/// The raw query string is used as-is, so `?a=1&b=2` and `?b=2&a=1` are
/// distinct keys. An empty query is dropped.
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}
