//! Transcript line filtering and normalization.
//!
//! In [`LineMode::Filtered`] a line is discarded when, after looking past a
//! leading `[HH:MM:SS]` timestamp, it is
//!
//! - a join/part/quit/topic announcement (see [`SYSTEM_PREFIXES`]),
//! - any other `*** ` status message,
//! - spoken by one of the network services in [`SERVICE_NICKS`]
//!   (`<NickServ> ...`, `* ChanServ ...`), compared case-insensitively,
//! - or blank.
//!
//! Surviving lines lose mIRC color codes and the bold/italic/underline/
//! reverse/reset toggles. [`LineMode::Verbatim`] keeps every line untouched.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::LineMode;

pub const SYSTEM_PREFIXES: &[&str] = &[
    "*** Joins:",
    "*** Parts:",
    "*** Quits:",
    "*** Now talking in",
    "*** Topic is:",
    "*** Set by",
    "*** ChanServ sets",
];

pub const SYSTEM_SENTINEL: &str = "*** ";

pub const SERVICE_NICKS: &[&str] = &[
    "chanserv", "nickserv", "hostserv", "memoserv", "operserv", "global",
];

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[0-9]{2}:[0-9]{2}:[0-9]{2}\]\s*").unwrap());

static SPEAKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[<*]\s*([A-Za-z0-9_\-\[\]\\`^{}|]+)[>*]?\s").unwrap());

static COLOR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x03(?:[0-9]{1,2}(?:,[0-9]{1,2})?)?").unwrap());

static FORMAT_TOGGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x02\x1D\x1F\x16\x0F]").unwrap());

#[derive(Debug, Clone, Copy)]
pub struct LineFilter {
    mode: LineMode,
    keep_timestamps: bool,
}

impl LineFilter {
    pub fn new(mode: LineMode, keep_timestamps: bool) -> Self {
        Self {
            mode,
            keep_timestamps,
        }
    }

    /// Returns the text to store, or `None` if the line is discarded.
    pub fn apply(&self, raw: &str) -> Option<String> {
        let line = raw.trim_end_matches(&['\r', '\n'][..]);

        if self.mode == LineMode::Verbatim {
            return Some(line.to_string());
        }

        let body = strip_timestamp(line);
        if should_skip(body) {
            return None;
        }

        let cleaned = strip_formatting(body);
        if cleaned.trim().is_empty() {
            return None;
        }

        if self.keep_timestamps {
            Some(strip_formatting(line))
        } else {
            Some(cleaned)
        }
    }
}

/// The line with a leading `[HH:MM:SS]` and following whitespace removed.
pub fn strip_timestamp(line: &str) -> &str {
    match TIMESTAMP.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// Whether a timestamp-stripped line is a system message or service chatter.
pub fn should_skip(body: &str) -> bool {
    if SYSTEM_PREFIXES.iter().any(|p| body.starts_with(p)) {
        return true;
    }

    if body.starts_with(SYSTEM_SENTINEL) {
        return true;
    }

    match SPEAKER.captures(body) {
        Some(caps) => {
            let nick = caps[1].to_ascii_lowercase();
            SERVICE_NICKS.contains(&nick.as_str())
        }
        None => false,
    }
}

/// Remove mIRC color sequences and single-byte formatting toggles.
pub fn strip_formatting(text: &str) -> String {
    let without_colors = COLOR_CODE.replace_all(text, "");
    FORMAT_TOGGLE.replace_all(&without_colors, "").into_owned()
}
