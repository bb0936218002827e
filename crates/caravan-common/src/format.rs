//! Rendering helpers for progress messages
//!
//! Byte counts use SI units (base 1000) with two decimal places; durations
//! render in the compact `1h2m3s` form. Both appear verbatim in progress
//! messages consumed by users, so the output format is load-bearing.

use chrono::Duration;

const BASE_UNIT: i64 = 1000;
const SI_UNITS: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];

/// Convert raw bytes to the nearest SI unit with two decimal places
///
/// Values below 1000 render as `"{n} bytes"`; the unit exponent is chosen
/// by repeated integer division so promotion happens exactly at powers of
/// 1000.
pub fn bytes_to_si(bytes: i64) -> String {
    if bytes < BASE_UNIT {
        return format!("{} bytes", bytes);
    }
    let mut div = BASE_UNIT;
    let mut exp = 0;
    let mut n = bytes / BASE_UNIT;
    while n >= BASE_UNIT {
        div *= BASE_UNIT;
        exp += 1;
        n /= BASE_UNIT;
    }
    format!("{:.2} {}B", bytes as f64 / div as f64, SI_UNITS[exp])
}

/// Render a duration as `1h2m3s`, dropping leading zero components
///
/// Sub-second precision is discarded; negative durations clamp to `0s`.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
