//! Identity key derivation from request headers.
//!
//! Resolution order:
//! 1. `X-Real-IP`
//! 2. first entry of `X-Forwarded-For` (later entries are client-controlled)
//! 3. CDN/edge headers: `CF-Connecting-IP`, `True-Client-IP`, `Fly-Client-IP`
//! 4. the shared [`UNKNOWN_IDENTITY`] bucket
//!
//! Blank or non-UTF-8 values are skipped. Every caller resolving to
//! [`UNKNOWN_IDENTITY`] shares one counter.

use http::HeaderMap;

/// Identity used when no client address can be found.
pub const UNKNOWN_IDENTITY: &str = "unknown";

const EDGE_HEADERS: [&str; 3] = ["cf-connecting-ip", "true-client-ip", "fly-client-ip"];

/// Derive the rate-limit identity key for a request.
///
/// # Example
/// ```
/// use http::HeaderMap;
/// use interaction_throttle::identity_key;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
/// assert_eq!(identity_key(&headers), "203.0.113.7");
///
/// assert_eq!(identity_key(&HeaderMap::new()), "unknown");
/// ```
pub fn identity_key(headers: &HeaderMap) -> String {
    header_value(headers, "x-real-ip")
        .or_else(|| header_value(headers, "x-forwarded-for").and_then(first_forwarded))
        .or_else(|| {
            EDGE_HEADERS
                .iter()
                .find_map(|name| header_value(headers, name))
        })
        .map(str::to_owned)
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_owned())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn first_forwarded(value: &str) -> Option<&str> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|first| !first.is_empty())
}
