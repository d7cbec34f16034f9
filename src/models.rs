//! Core data models.
//!
//! These types are what flows between the importer, the store, and the
//! query layer. Dates are carried as [`NaiveDate`] in memory and stored as
//! `YYYY-MM-DD` text so that string ordering matches calendar ordering.

use chrono::NaiveDate;
use serde::Serialize;

/// Storage format for `log_entries.log_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A chat network, keyed by its directory name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

/// A transcript line ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub line_number: i64,
    pub content: String,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date as stored in the database or sent by clients.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}
