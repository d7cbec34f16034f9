//! Database statistics and health overview.
//!
//! Summarizes what has been imported: entry counts, the covered date range,
//! per-network and per-channel breakdowns, and when the last import ran.
//! Served by `GET /api/stats` and printed by `znc-search stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error;
use crate::ingest::LAST_IMPORT_KEY;

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkCount {
    pub network: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelCount {
    pub channel: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_entries: i64,
    pub network_count: i64,
    pub channel_count: i64,
    pub date_range: DateRange,
    pub networks: Vec<NetworkCount>,
    pub top_channels: Vec<ChannelCount>,
    pub last_import: Option<String>,
}

pub async fn collect_stats(pool: &SqlitePool) -> error::Result<Stats> {
    let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
        .fetch_one(pool)
        .await?;

    let network_count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT network_id) FROM log_entries")
            .fetch_one(pool)
            .await?;

    let channel_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT channel_name) FROM log_entries WHERE channel_name LIKE '#%'",
    )
    .fetch_one(pool)
    .await?;

    let range = sqlx::query("SELECT MIN(log_date) AS first_date, MAX(log_date) AS last_date FROM log_entries")
        .fetch_one(pool)
        .await?;

    let networks = sqlx::query(
        r#"
        SELECT n.display_name AS network, COUNT(*) AS count
        FROM log_entries le
        JOIN networks n ON le.network_id = n.id
        GROUP BY n.display_name
        ORDER BY count DESC, n.display_name ASC
        "#,
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| NetworkCount {
        network: row.get("network"),
        count: row.get("count"),
    })
    .collect();

    let top_channels = sqlx::query(
        r#"
        SELECT channel_name, COUNT(*) AS count
        FROM log_entries
        GROUP BY channel_name
        ORDER BY count DESC, channel_name ASC
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| ChannelCount {
        channel: row.get("channel_name"),
        count: row.get("count"),
    })
    .collect();

    let last_import: Option<String> =
        sqlx::query_scalar("SELECT value FROM import_metadata WHERE key = ?")
            .bind(LAST_IMPORT_KEY)
            .fetch_optional(pool)
            .await?;

    Ok(Stats {
        total_entries,
        network_count,
        channel_count,
        date_range: DateRange {
            start: range.get("first_date"),
            end: range.get("last_date"),
        },
        networks,
        top_channels,
        last_import,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("ZNC log search: Database Stats");
    println!("===============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", human_size(db_size));
    println!();
    println!("  Entries:     {}", stats.total_entries);
    println!("  Networks:    {}", stats.network_count);
    println!("  Channels:    {}", stats.channel_count);
    match (&stats.date_range.start, &stats.date_range.end) {
        (Some(start), Some(end)) => println!("  Date range:  {} to {}", start, end),
        _ => println!("  Date range:  (empty)"),
    }
    println!("  Last import: {}", describe_import_time(stats.last_import.as_deref()));

    if !stats.networks.is_empty() {
        println!();
        println!("  By network:");
        println!("  {:<32} {:>12}", "NETWORK", "ENTRIES");
        println!("  {}", "-".repeat(45));
        for n in &stats.networks {
            println!("  {:<32} {:>12}", n.network, n.count);
        }
    }

    if !stats.top_channels.is_empty() {
        println!();
        println!("  Top channels:");
        println!("  {:<32} {:>12}", "CHANNEL", "ENTRIES");
        println!("  {}", "-".repeat(45));
        for c in &stats.top_channels {
            println!("  {:<32} {:>12}", c.channel, c.count);
        }
    }

    pool.close().await;
    Ok(())
}

/// Database file size in the largest unit that keeps the value at least 1.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// The stored RFC 3339 import time, shown in UTC to the minute.
fn describe_import_time(stored: Option<&str>) -> String {
    match stored {
        None => "never".to_string(),
        Some(raw) => chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&chrono::Utc).format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|_| raw.to_string()),
    }
}
