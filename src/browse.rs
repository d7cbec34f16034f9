//! Network and channel listings for pickers.

use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::Network;

/// Networks that have at least one stored entry, ordered by display name.
pub async fn list_networks(pool: &SqlitePool) -> Result<Vec<Network>> {
    let rows = sqlx::query(
        r#"
        SELECT n.id, n.display_name
        FROM networks n
        WHERE EXISTS (SELECT 1 FROM log_entries le WHERE le.network_id = n.id)
        ORDER BY n.display_name ASC, n.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Network {
            id: row.get("id"),
            display_name: row.get("display_name"),
        })
        .collect())
}

/// Channels (names starting with `#`) with stored entries in `network`.
/// Private-message logs are left out.
pub async fn list_channels(pool: &SqlitePool, network: &str) -> Result<Vec<String>> {
    let channels = sqlx::query_scalar(
        r#"
        SELECT DISTINCT channel_name
        FROM log_entries
        WHERE network_id = ? AND channel_name LIKE '#%'
        ORDER BY channel_name ASC
        "#,
    )
    .bind(network)
    .fetch_all(pool)
    .await?;
    Ok(channels)
}
