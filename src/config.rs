//! TOML configuration.
//!
//! A single [`Config`] is loaded at process start and passed by reference to
//! every component. Nothing reads paths or credentials from globals.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub import: ImportConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_secs() -> u64 {
    10
}
fn default_acquire_timeout_secs() -> u64 {
    30
}

/// How raw transcript lines are turned into stored entries.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineMode {
    /// Drop system messages and service bots, strip formatting codes.
    #[default]
    Filtered,
    /// Store every line as-is.
    Verbatim,
}

/// Which lines consume a line number.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Numbering {
    /// Every raw line in the file is numbered; discarded lines leave gaps.
    #[default]
    Raw,
    /// Only stored lines are numbered, densely from 1.
    Kept,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Directory holding one subdirectory per network.
    pub base_path: PathBuf,
    /// Path of the log root relative to each network directory.
    #[serde(default = "default_log_subdir")]
    pub log_subdir: PathBuf,
    #[serde(default = "default_import_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub line_mode: LineMode,
    #[serde(default)]
    pub numbering: Numbering,
    #[serde(default)]
    pub keep_timestamps: bool,
    /// Display-name overrides keyed by network identifier.
    #[serde(default)]
    pub network_names: BTreeMap<String, String>,
}

fn default_log_subdir() -> PathBuf {
    PathBuf::from("moddata/log")
}
fn default_import_batch_size() -> usize {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_context_lines")]
    pub context_before: i64,
    #[serde(default = "default_context_lines")]
    pub context_after: i64,
    #[serde(default = "default_max_context")]
    pub max_context: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            context_before: default_context_lines(),
            context_after: default_context_lines(),
            max_context: default_max_context(),
        }
    }
}

fn default_max_results() -> usize {
    1000
}
fn default_context_lines() -> i64 {
    2
}
fn default_max_context() -> i64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_session_ttl_secs() -> i64 {
    12 * 60 * 60
}

impl ImportConfig {
    /// Display name for a network: the configured override, else the
    /// identifier with its first letter upper-cased and the rest lower-cased.
    pub fn display_name(&self, network_id: &str) -> String {
        if let Some(name) = self.network_names.get(network_id) {
            return name.clone();
        }
        let mut chars = network_id.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    }

    /// Log root for one network: `<base_path>/<network>/<log_subdir>`.
    pub fn network_log_root(&self, network_id: &str) -> PathBuf {
        self.base_path.join(network_id).join(&self.log_subdir)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.import.batch_size == 0 {
        anyhow::bail!("import.batch_size must be > 0");
    }

    if config.search.max_results == 0 {
        anyhow::bail!("search.max_results must be >= 1");
    }

    if config.search.context_before < 0 || config.search.context_after < 0 {
        anyhow::bail!("search.context_before and search.context_after must be >= 0");
    }

    if config.search.max_context < config.search.context_before.max(config.search.context_after) {
        anyhow::bail!("search.max_context must be >= the default context window");
    }

    if config.auth.session_ttl_secs < 1 {
        anyhow::bail!("auth.session_ttl_secs must be >= 1");
    }

    Ok(())
}
