use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table, index, and trigger. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS networks (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            network_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(network_id, name),
            FOREIGN KEY (network_id) REFERENCES networks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            network_id TEXT NOT NULL,
            channel_name TEXT NOT NULL,
            log_date TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            content TEXT NOT NULL,
            FOREIGN KEY (network_id) REFERENCES networks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-file manifest, written with the last batch of each file
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imported_files (
            network_id TEXT NOT NULL,
            channel_name TEXT NOT NULL,
            log_date TEXT NOT NULL,
            file_name TEXT NOT NULL,
            entry_count INTEGER NOT NULL,
            imported_at INTEGER NOT NULL,
            PRIMARY KEY (network_id, channel_name, log_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 index over log_entries.content, kept in sync by triggers
    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS log_entries_fts USING fts5(
            content,
            content='log_entries',
            content_rowid='id'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS log_entries_ai AFTER INSERT ON log_entries BEGIN
            INSERT INTO log_entries_fts(rowid, content) VALUES (new.id, new.content);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS log_entries_ad AFTER DELETE ON log_entries BEGIN
            INSERT INTO log_entries_fts(log_entries_fts, rowid, content)
            VALUES ('delete', old.id, old.content);
        END
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_log_entries_file ON log_entries(network_id, channel_name, log_date, line_number)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_log_entries_network_date ON log_entries(network_id, log_date DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        apply_schema(&pool).await.unwrap();
        apply_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "channels",
            "import_metadata",
            "imported_files",
            "log_entries",
            "log_entries_fts",
            "networks",
            "users",
        ] {
            assert!(
                tables.iter().any(|t| t == expected),
                "missing table {}: {:?}",
                expected,
                tables
            );
        }
    }

    #[tokio::test]
    async fn test_fts_follows_inserts_and_deletes() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();

        sqlx::query("INSERT INTO networks (id, display_name) VALUES ('libera', 'Libera')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO log_entries (network_id, channel_name, log_date, line_number, content) VALUES ('libera', '#rust', '2025-01-01', 1, 'borrow checker')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let hits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM log_entries_fts WHERE log_entries_fts MATCH 'borrow'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(hits, 1);

        sqlx::query("DELETE FROM log_entries")
            .execute(&pool)
            .await
            .unwrap();

        let hits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM log_entries_fts WHERE log_entries_fts MATCH 'borrow'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(hits, 0);
    }
}
