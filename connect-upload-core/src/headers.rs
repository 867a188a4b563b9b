//! Connect request headers shared by both roles.

use std::time::Duration;

/// Header carrying the protocol version.
pub const CONNECT_PROTOCOL_VERSION_HEADER: &str = "connect-protocol-version";

/// The only protocol version spoken.
pub const CONNECT_PROTOCOL_VERSION: &str = "1";

/// Header carrying the caller's deadline in milliseconds.
pub const CONNECT_TIMEOUT_MS_HEADER: &str = "connect-timeout-ms";

/// The header value holds at most 10 digits.
const MAX_TIMEOUT_MS: u128 = 9_999_999_999;

/// Read a `connect-timeout-ms` value. Zero, garbage and over-long values mean
/// no deadline.
pub fn parse_timeout_ms(value: &str) -> Option<Duration> {
    if value.is_empty() || value.len() > 10 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match value.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(ms) => Some(Duration::from_millis(ms)),
    }
}

/// Render a deadline for `connect-timeout-ms`.
///
/// Sub-millisecond deadlines round up to 1 ms. Deadlines too long for the
/// header give `None`; the caller still enforces them locally.
pub fn format_timeout_ms(timeout: Duration) -> Option<String> {
    let ms = timeout.as_millis().max(1);
    (ms <= MAX_TIMEOUT_MS).then(|| ms.to_string())
}

/// The tighter of two optional deadlines.
pub fn effective_timeout(ours: Option<Duration>, theirs: Option<Duration>) -> Option<Duration> {
    match (ours, theirs) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
