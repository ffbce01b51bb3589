//! Timestamp conversions between wire formats and epoch nanoseconds.

use chrono::{DateTime, TimeZone, Utc};

/// Converts fractional Unix seconds (the envelope timestamp format) to epoch
/// nanoseconds, preserving sub-second precision. Values before the epoch
/// clamp to zero.
pub fn unix_nanos_from_secs_f64(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    let whole = secs.trunc();
    let frac = secs - whole;
    (whole as u64) * 1_000_000_000 + (frac * 1e9).round() as u64
}

/// Epoch nanoseconds → whole Unix seconds.
pub fn unix_secs_from_nanos(nanos: u64) -> i64 {
    (nanos / 1_000_000_000) as i64
}

/// Epoch nanoseconds → UTC datetime. Out-of-range values map to the epoch.
pub fn datetime_from_nanos(nanos: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(unix_secs_from_nanos(nanos), (nanos % 1_000_000_000) as u32)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default())
}
