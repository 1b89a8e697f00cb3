//! Conversions between numeric seconds and the display strings stored on videos.

use crate::model::Video;

/// Format whole seconds as `M:SS`, or `H:MM:SS` once an hour is reached.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Parse a `M:SS` / `H:MM:SS` string back into seconds.
pub fn parse_duration(value: &str) -> Option<u64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let mut total: u64 = 0;
    for part in parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(part.parse().ok()?)?;
    }
    Some(total)
}

/// Convert an ISO-8601 duration (`PT1H2M3S`, `P1DT2H`) into whole seconds.
///
/// Unparseable input yields 0, which is also what the API reports for live streams.
pub fn parse_iso8601_duration(value: &str) -> u64 {
    let Some(rest) = value.trim().strip_prefix('P') else {
        return 0;
    };

    let mut total: u64 = 0;
    let mut number = String::new();
    let mut in_time = false;

    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' | '.' => number.push(c),
            unit => {
                let Ok(amount) = number.parse::<f64>() else {
                    return 0;
                };
                number.clear();
                let factor = match (unit, in_time) {
                    ('W', false) => 604_800.0,
                    ('D', false) => 86_400.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => return 0,
                };
                // Fractions count before truncation: PT1.5M is 90 seconds
                let seconds = (amount * factor).floor();
                if !seconds.is_finite() || seconds >= u64::MAX as f64 {
                    return 0;
                }
                let Some(sum) = total.checked_add(seconds as u64) else {
                    return 0;
                };
                total = sum;
            }
        }
    }

    // Trailing digits without a unit designator
    if !number.is_empty() {
        return 0;
    }
    total
}

/// Format a fractional playhead position the same way as a duration.
pub fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return format_duration(0);
    }
    format_duration(seconds.floor() as u64)
}

/// Total runtime of a set of videos in whole minutes.
pub fn total_minutes(videos: &[Video]) -> u64 {
    videos.iter().map(|v| v.duration_seconds).sum::<u64>() / 60
}
