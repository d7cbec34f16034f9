//! Accounts and sessions for the HTTP API.
//!
//! Passwords are stored as `<salt>$<hex(HMAC-SHA256(salt, password))>` with a
//! random UUID salt. A successful login mints an opaque bearer token held in
//! an in-memory [`SessionStore`] until it expires or the client logs out;
//! restarting the server logs everyone out.
//!
//! Credential lookup sits behind [`CredentialCheck`] so the server can be
//! driven by something other than the `users` table.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::migrate;

type HmacSha256 = Hmac<Sha256>;

const SALT_SEPARATOR: char = '$';

pub const MIN_PASSWORD_LEN: usize = 8;

#[async_trait]
pub trait CredentialCheck: Send + Sync {
    /// Returns the canonical username when the password matches.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<String>>;
}

/// Credentials backed by the `users` table.
pub struct SqliteCredentials {
    pool: SqlitePool,
}

impl SqliteCredentials {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialCheck for SqliteCredentials {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<String>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT username, password_hash FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .filter(|(_, stored)| verify_password(stored, password))
            .map(|(name, _)| name))
    }
}

fn mac_for(salt: &str, password: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac
}

pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = mac_for(&salt, password).finalize().into_bytes();
    format!("{}{}{}", salt, SALT_SEPARATOR, hex::encode(digest))
}

/// Constant-time check of `password` against a stored hash.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, digest_hex)) = stored.split_once(SALT_SEPARATOR) else {
        return false;
    };
    let Ok(digest) = hex::decode(digest_hex) else {
        return false;
    };
    mac_for(salt, password).verify_slice(&digest).is_ok()
}

/// New passwords need at least [`MIN_PASSWORD_LEN`] characters.
pub fn check_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

/// Create a user, or reset the password of an existing one.
pub async fn add_user(pool: &SqlitePool, username: &str, password: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::validation("username required"));
    }
    check_new_password(password)?;

    sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)
        ON CONFLICT(username) DO UPDATE SET password_hash = excluded.password_hash
        "#,
    )
    .bind(username)
    .bind(hash_password(password))
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace the password of an existing user.
pub async fn set_password(pool: &SqlitePool, username: &str, password: &str) -> Result<()> {
    check_new_password(password)?;
    let updated = sqlx::query("UPDATE users SET password_hash = ? WHERE username = ?")
        .bind(hash_password(password))
        .bind(username)
        .execute(pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::not_found(format!("user {}", username)));
    }
    Ok(())
}

pub async fn delete_user(pool: &SqlitePool, username: &str) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM users WHERE username = ?")
        .bind(username)
        .execute(pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(Error::not_found(format!("user {}", username)));
    }
    Ok(())
}

impl From<(i64, String, i64)> for UserInfo {
    fn from((id, username, created_at): (i64, String, i64)) -> Self {
        Self {
            id,
            username,
            created_at,
        }
    }
}

pub async fn user_info(pool: &SqlitePool, username: &str) -> Result<UserInfo> {
    let row: Option<(i64, String, i64)> =
        sqlx::query_as("SELECT id, username, created_at FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
    row.map(UserInfo::from)
        .ok_or_else(|| Error::not_found(format!("user {}", username)))
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<UserInfo>> {
    let rows: Vec<(i64, String, i64)> =
        sqlx::query_as("SELECT id, username, created_at FROM users ORDER BY username")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(UserInfo::from).collect())
}

fn format_created(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// CLI entry point for `znc-search user add`.
pub async fn run_user_add(config: &Config, username: &str, password: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let result = add_user(&pool, username, password).await;
    pool.close().await;
    result?;
    println!("user {} saved", username.trim());
    Ok(())
}

/// CLI entry point for `znc-search user password`.
pub async fn run_user_password(config: &Config, username: &str, password: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let result = set_password(&pool, username, password).await;
    pool.close().await;
    result?;
    println!("password for {} reset", username);
    Ok(())
}

/// CLI entry point for `znc-search user delete`.
pub async fn run_user_delete(config: &Config, username: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let result = delete_user(&pool, username).await;
    pool.close().await;
    result?;
    println!("user {} deleted", username);
    Ok(())
}

/// CLI entry point for `znc-search user info`.
pub async fn run_user_info(config: &Config, username: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let result = user_info(&pool, username).await;
    pool.close().await;
    let user = result?;

    println!("  ID:       {}", user.id);
    println!("  Username: {}", user.username);
    println!("  Created:  {}", format_created(user.created_at));
    Ok(())
}

/// CLI entry point for `znc-search user list`.
pub async fn run_user_list(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let result = list_users(&pool).await;
    pool.close().await;
    let users = result?;

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    println!("{:<6} {:<24} {}", "ID", "USERNAME", "CREATED");
    for user in &users {
        println!(
            "{:<6} {:<24} {}",
            user.id,
            user.username,
            format_created(user.created_at)
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Session {
    username: String,
    expires_at: i64,
}

/// Bearer tokens issued at login.
pub struct SessionStore {
    ttl_secs: i64,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, username: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: Utc::now().timestamp() + self.ttl_secs,
        };
        let mut sessions = self.sessions.write().await;
        let now = Utc::now().timestamp();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session);
        token
    }

    /// Username for a live token. Expired tokens are dropped.
    pub async fn validate(&self, token: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(s) if s.expires_at > now => return Ok(s.username.clone()),
                Some(_) => {}
                None => return Err(Error::Unauthorized),
            }
        }
        self.sessions.write().await.remove(token);
        Err(Error::Unauthorized)
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}
