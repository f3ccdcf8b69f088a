//! `Cache-Control: max-age` expiry markers.
//!
//! Write-back stores `max-age=<epoch millis>` on the cached request envelope.
//! The value is an absolute expiry timestamp, not the relative seconds delta
//! HTTP uses; the activation sweep compares it against the current clock.

use chrono::Utc;

/// Header name the marker is stored under (lowercase, as persisted).
pub const HEADER: &str = "cache-control";

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Header value for an entry expiring at `expires_at_ms`.
pub fn marker(expires_at_ms: i64) -> String {
    format!("max-age={expires_at_ms}")
}

/// Extract the expiry timestamp from a `Cache-Control` value.
///
/// Accepts other directives around `max-age`; returns `None` when the
/// directive is missing or not an integer.
pub fn parse(value: &str) -> Option<i64> {
    value.split(',').find_map(|directive| {
        let (name, ms) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") { ms.trim().parse().ok() } else { None }
    })
}

/// Whether an entry with this expiry is stale at `now_ms`.
pub fn is_expired(expires_at_ms: i64, now_ms: i64) -> bool {
    now_ms > expires_at_ms
}
