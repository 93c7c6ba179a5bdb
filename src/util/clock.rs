//! Wall-clock helpers. All scheduler timestamps are milliseconds since the Unix epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Convert a `SystemTime` into epoch milliseconds, clamping pre-epoch values to zero.
#[must_use]
pub fn system_time_ms(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Add a duration to an epoch-millisecond timestamp.
#[must_use]
pub fn after_ms(base_ms: u128, delay: Duration) -> u128 {
    base_ms.saturating_add(delay.as_millis())
}
