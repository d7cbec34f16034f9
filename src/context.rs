//! Surrounding lines for a search hit.
//!
//! Given a (network, channel, date, line) and a window size, returns the
//! stored entries of that file whose line numbers fall in
//! `[max(1, line - before), line + after]`, plus whether the window can grow
//! in either direction. Used by `znc-search context` and `POST /api/context`.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::config::{Config, SearchConfig};
use crate::db;
use crate::error::{Error, Result};
use crate::models::{format_date, parse_date};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextRequest {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub line: i64,
    #[serde(default)]
    pub lines_before: Option<i64>,
    #[serde(default)]
    pub lines_after: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextLine {
    pub line: i64,
    pub content: String,
    pub is_match: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextWindow {
    pub context: Vec<ContextLine>,
    pub start_line: i64,
    pub end_line: i64,
    pub total_lines: i64,
    pub can_expand_up: bool,
    pub can_expand_down: bool,
}

/// Clamp a requested window size to `[0, max]`, falling back to `default`.
fn window_size(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(0, max.max(0))
}

pub async fn get_context(
    pool: &SqlitePool,
    req: &ContextRequest,
    limits: &SearchConfig,
) -> Result<ContextWindow> {
    let network = req.network.trim();
    let channel = req.channel.trim();
    if network.is_empty() || channel.is_empty() || req.date.trim().is_empty() {
        return Err(Error::validation("network, channel, and date are required"));
    }
    let date = parse_date(req.date.trim())
        .map(format_date)
        .ok_or_else(|| Error::validation(format!("date must be YYYY-MM-DD, got {:?}", req.date)))?;
    if req.line < 1 {
        return Err(Error::validation("line must be 1 or greater"));
    }

    let before = window_size(req.lines_before, limits.context_before, limits.max_context);
    let after = window_size(req.lines_after, limits.context_after, limits.max_context);

    let total_lines: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(line_number) FROM log_entries WHERE network_id = ? AND channel_name = ? AND log_date = ?",
    )
    .bind(network)
    .bind(channel)
    .bind(&date)
    .fetch_one(pool)
    .await?;

    let Some(total_lines) = total_lines else {
        return Err(Error::not_found(format!(
            "no log for {} {} on {}",
            network, channel, date
        )));
    };

    let start_line = req.line.saturating_sub(before).max(1);
    let end_line = req.line.saturating_add(after);

    let rows = sqlx::query(
        r#"
        SELECT line_number, content
        FROM log_entries
        WHERE network_id = ? AND channel_name = ? AND log_date = ?
          AND line_number BETWEEN ? AND ?
        ORDER BY line_number ASC, id ASC
        "#,
    )
    .bind(network)
    .bind(channel)
    .bind(&date)
    .bind(start_line)
    .bind(end_line)
    .fetch_all(pool)
    .await?;

    let context = rows
        .iter()
        .map(|row| {
            let line: i64 = row.get("line_number");
            ContextLine {
                line,
                content: row.get("content"),
                is_match: line == req.line,
            }
        })
        .collect();

    Ok(ContextWindow {
        context,
        start_line,
        end_line,
        total_lines,
        can_expand_up: start_line > 1,
        can_expand_down: end_line < total_lines,
    })
}

/// CLI entry point: calls [`get_context`] and prints the window.
pub async fn run_context(config: &Config, req: &ContextRequest) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let result = get_context(&pool, req, &config.search).await;
    pool.close().await;
    let window = result?;

    println!(
        "--- {} {} lines {}-{} of {} ---",
        req.channel, req.date, window.start_line, window.end_line, window.total_lines
    );
    for line in &window.context {
        let marker = if line.is_match { ">" } else { " " };
        println!("{} {:>6}  {}", marker, line.line, line.content);
    }
    if window.can_expand_up || window.can_expand_down {
        println!();
        println!(
            "more: {}{}",
            if window.can_expand_up { "above " } else { "" },
            if window.can_expand_down { "below" } else { "" }
        );
    }

    Ok(())
}
