//! Log search.
//!
//! The matching strategy is picked from the shape of the query:
//!
//! - **Full-text**: the query is a single word (`^\w+$`). Matched through the
//!   FTS5 index `log_entries_fts`; fast, token based.
//! - **Substring**: anything containing whitespace or punctuation (phrases,
//!   URLs, nicks in brackets). Matched with `LIKE '%…%'`, exact and
//!   case-insensitive for ASCII.
//!
//! Channel and date filters are ANDed onto either strategy. Results are
//! ordered newest day first, then by line within the day, and capped at
//! `[search] max_results`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::LazyLock;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::models::{format_date, parse_date};

static SINGLE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").unwrap());

/// Search parameters as sent by clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    FullText,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub network_id: String,
    pub network: String,
    pub channel: String,
    pub date: String,
    pub line: i64,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub truncated: bool,
    pub mode: MatchMode,
}

/// A request that passed validation, with blanks normalized away.
#[derive(Debug)]
struct SearchPlan {
    network: String,
    query: String,
    channel: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    mode: MatchMode,
}

pub fn select_mode(query: &str) -> MatchMode {
    if SINGLE_WORD.is_match(query) {
        MatchMode::FullText
    } else {
        MatchMode::Substring
    }
}

fn plan(req: &SearchRequest) -> Result<SearchPlan> {
    let network = req.network.trim();
    if network.is_empty() {
        return Err(Error::validation("network required"));
    }
    let query = req.query.trim();
    if query.is_empty() {
        return Err(Error::validation("query required"));
    }

    Ok(SearchPlan {
        network: network.to_string(),
        query: query.to_string(),
        channel: non_blank(req.channel.as_deref()).map(str::to_string),
        start_date: validate_date("start_date", req.start_date.as_deref())?,
        end_date: validate_date("end_date", req.end_date.as_deref())?,
        mode: select_mode(query),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn validate_date(field: &str, value: Option<&str>) -> Result<Option<String>> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(|d| Some(format_date(d)))
            .ok_or_else(|| Error::validation(format!("{} must be YYYY-MM-DD, got {:?}", field, raw))),
    }
}

/// FTS5 term for a single word. Quoting keeps words like `AND` or `NEAR`
/// from being read as operators.
fn fts_term(word: &str) -> String {
    format!("\"{}\"", word.replace('"', "\"\""))
}

/// `LIKE` pattern for a literal substring, escaping with `\`.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn build_query(plan: &SearchPlan, limit: i64) -> QueryBuilder<'static, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT le.network_id, n.display_name, le.channel_name, le.log_date, le.line_number, le.content
        FROM log_entries le
        JOIN networks n ON le.network_id = n.id
        WHERE le.network_id = "#,
    );
    qb.push_bind(plan.network.clone());

    match plan.mode {
        MatchMode::FullText => {
            qb.push(" AND le.id IN (SELECT rowid FROM log_entries_fts WHERE log_entries_fts MATCH ");
            qb.push_bind(fts_term(&plan.query));
            qb.push(")");
        }
        MatchMode::Substring => {
            qb.push(" AND le.content LIKE ");
            qb.push_bind(like_pattern(&plan.query));
            qb.push(" ESCAPE '\\'");
        }
    }

    if let Some(channel) = &plan.channel {
        qb.push(" AND le.channel_name = ");
        qb.push_bind(channel.clone());
    }
    if let Some(start) = &plan.start_date {
        qb.push(" AND le.log_date >= ");
        qb.push_bind(start.clone());
    }
    if let Some(end) = &plan.end_date {
        qb.push(" AND le.log_date <= ");
        qb.push_bind(end.clone());
    }

    qb.push(" ORDER BY le.log_date DESC, le.line_number ASC, le.id ASC LIMIT ");
    qb.push_bind(limit);
    qb
}

/// Core search function returning structured results.
///
/// Shared by `znc-search search` and `POST /api/search`. Returns at most
/// `cap` hits (at least one); `truncated` is set when more rows matched.
pub async fn search_entries(
    pool: &SqlitePool,
    req: &SearchRequest,
    cap: usize,
) -> Result<SearchResponse> {
    let plan = plan(req)?;
    let cap = cap.max(1);
    let limit = i64::try_from(cap.saturating_add(1)).unwrap_or(i64::MAX);

    let rows = build_query(&plan, limit).build().fetch_all(pool).await?;

    let truncated = rows.len() > cap;
    let results: Vec<SearchHit> = rows
        .iter()
        .take(cap)
        .map(|row| SearchHit {
            network_id: row.get("network_id"),
            network: row.get("display_name"),
            channel: row.get("channel_name"),
            date: row.get("log_date"),
            line: row.get("line_number"),
            content: row.get("content"),
        })
        .collect();

    tracing::debug!(
        network = %plan.network,
        mode = ?plan.mode,
        hits = results.len(),
        truncated,
        "search"
    );

    Ok(SearchResponse {
        total: results.len(),
        results,
        truncated,
        mode: plan.mode,
    })
}

/// CLI entry point: calls [`search_entries`] and prints results to stdout.
pub async fn run_search(config: &Config, req: &SearchRequest) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let response = search_entries(&pool, req, config.search.max_results).await?;
    pool.close().await;

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{}] {} / {}:{}",
            i + 1,
            hit.date,
            hit.network,
            hit.channel,
            hit.line
        );
        println!("    {}", hit.content);
    }
    println!();
    println!(
        "{} result{} ({} match){}",
        response.total,
        if response.total == 1 { "" } else { "s" },
        match response.mode {
            MatchMode::FullText => "full-text",
            MatchMode::Substring => "substring",
        },
        if response.truncated {
            ", truncated"
        } else {
            ""
        }
    );

    Ok(())
}
