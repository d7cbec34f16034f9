//! Calendar dates from ZNC log file names.
//!
//! Two naming schemes are accepted:
//!
//! | Shape | Example |
//! |-------|---------|
//! | `YYYY-MM-DD.log` | `2025-01-31.log` |
//! | `<anything>_YYYYMMDD.log` | `#rust_20250131.log` |
//!
//! Anything else yields `None`; callers skip such files without treating
//! them as errors.

use chrono::NaiveDate;

pub const LOG_SUFFIX: &str = ".log";

pub fn parse_log_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_suffix(LOG_SUFFIX).unwrap_or(file_name);

    if let Some(date) = parse_dashed(stem) {
        return Some(date);
    }

    let tail = match stem.rfind('_') {
        Some(pos) => &stem[pos + 1..],
        None => stem,
    };
    parse_compact(tail)
}

/// Strict `YYYY-MM-DD`: ten characters, dashes at fixed offsets.
fn parse_dashed(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    ymd(&s[0..4], &s[5..7], &s[8..10])
}

/// Strict `YYYYMMDD`: exactly eight ASCII digits.
fn parse_compact(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    ymd(&s[0..4], &s[4..6], &s[6..8])
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    if ![year, month, day]
        .iter()
        .all(|part| part.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
