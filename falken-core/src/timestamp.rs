//! Microsecond timestamps (spec.md §3 invariant 1, §4.1 path layout).

use std::time::{SystemTime, UNIX_EPOCH};

/// Width of the zero-padded decimal timestamp embedded in a resource
/// filename: `resource.{timestamp_micros:016d}`. Good for roughly 3.16e8
/// years past the epoch, per the original implementation's comment.
pub const TIMESTAMP_WIDTH: usize = 16;

/// Returns the current time in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch");
    now.as_micros() as i64
}

/// Renders a microsecond timestamp as the fixed-width decimal string used in
/// `resource.{timestamp}` filenames, preserving lexical order equal to
/// chronological order.
pub fn format_micros(timestamp_micros: i64) -> String {
    format!("{timestamp_micros:0width$}", width = TIMESTAMP_WIDTH)
}
