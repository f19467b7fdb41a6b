//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a UTC timestamp into seconds since the unix epoch with millisecond resolution.
pub fn timestamp_to_seconds(timestamp: &chrono::DateTime<chrono::Utc>) -> f64 {
    timestamp.timestamp_millis() as f64 * 1e-3
}
