//! Log import pipeline.
//!
//! Walks `<base_path>/<network>/<log_subdir>/<channel>/<file>.log`, parses the
//! date out of each file name, runs every line through the [`LineFilter`], and
//! inserts the survivors in fixed-size batches.
//!
//! The unit of import is one channel-day. Both file name formats are accepted,
//! so a channel directory can hold two files for the same date
//! (`2025-01-01.log` and `#rust_20250101.log`); they are read in name order as
//! one stream and numbered continuously.
//!
//! Each batch is its own transaction, so a failure or interruption part-way
//! through a day leaves earlier batches (and earlier days) committed. The
//! last batch of a day also writes its row in `imported_files`; a day whose
//! stored entry count disagrees with that manifest was only partially
//! imported and is reported when the importer next skips it.
//!
//! Failure handling per unit:
//!
//! | Unit | Failure | Effect |
//! |------|---------|--------|
//! | whole run | base path missing | [`Error::Config`], nothing imported |
//! | network / channel | directory missing or unreadable | warning, unit skipped |
//! | file | name has no date | debug log, file skipped |
//! | day | a file cannot be read | warning, day skipped |
//! | batch | database error | error log, rest of the day abandoned |

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::{Config, ImportConfig, Numbering};
use crate::db;
use crate::error::{Error, Result};
use crate::filter::LineFilter;
use crate::logdate::{parse_log_date, LOG_SUFFIX};
use crate::migrate;
use crate::models::{format_date, NewLogEntry};
use crate::stats;

pub const LAST_IMPORT_KEY: &str = "last_import_date";

/// Per-network import summary. File counters count files, not days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub network: String,
    pub channels: usize,
    pub files_imported: usize,
    pub files_skipped: usize,
    pub files_unparseable: usize,
    pub files_failed: usize,
    pub lines_imported: u64,
    pub cancelled: bool,
}

enum WriteOutcome {
    Complete(u64),
    Failed(u64),
    Cancelled(u64),
}

/// A `.log` file whose name carries a date.
#[derive(Debug, Clone)]
struct LogFile {
    name: String,
    path: PathBuf,
}

/// A channel directory's `.log` files, grouped by the date in their name.
#[derive(Debug, Default)]
struct ChannelFiles {
    days: BTreeMap<NaiveDate, Vec<LogFile>>,
    undated: Vec<String>,
}

/// The (network, channel, date) triple one day of logs maps to.
struct DayKey<'a> {
    network: &'a str,
    channel: &'a str,
    date: String,
    /// Comma-separated source file names, as recorded in the manifest.
    files: String,
}

pub struct Importer<'a> {
    pool: &'a SqlitePool,
    config: &'a ImportConfig,
    filter: LineFilter,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Importer<'a> {
    pub fn new(pool: &'a SqlitePool, config: &'a ImportConfig) -> Self {
        Self {
            pool,
            config,
            filter: LineFilter::new(config.line_mode, config.keep_timestamps),
            cancel: None,
        }
    }

    /// Stop between days and batches once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Import every network under the base path.
    pub async fn import_all(&self, force: bool) -> Result<Vec<ImportReport>> {
        self.import_selected(None, force).await
    }

    /// Import one named network, or every network under the base path.
    pub async fn import_selected(&self, only: Option<&str>, force: bool) -> Result<Vec<ImportReport>> {
        let networks = select_networks(self.config, only)?;

        let mut reports = Vec::with_capacity(networks.len());
        for network in networks {
            if self.is_cancelled() {
                break;
            }
            match self.import_network(&network, force).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(network = %network, error = %e, "network import failed");
                    reports.push(ImportReport {
                        network,
                        ..Default::default()
                    });
                }
            }
        }
        Ok(reports)
    }

    /// Import every channel of one network. Returns what was written.
    pub async fn import_network(&self, network_id: &str, force: bool) -> Result<ImportReport> {
        validate_path_component("network", network_id)?;

        let mut report = ImportReport {
            network: network_id.to_string(),
            ..Default::default()
        };

        let display_name = self.config.display_name(network_id);
        upsert_network(self.pool, network_id, &display_name).await?;

        let log_root = self.config.network_log_root(network_id);
        if !log_root.is_dir() {
            warn!(network = %network_id, path = %log_root.display(), "log directory not found, skipping network");
            return Ok(report);
        }

        info!(network = %network_id, display_name = %display_name, force, "importing network");

        let channels = match sorted_children(&log_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(network = %network_id, path = %log_root.display(), error = %e, "cannot list channels");
                return Ok(report);
            }
        };

        for entry in channels.into_iter().filter(|e| e.file_type().is_dir()) {
            let channel = entry.file_name().to_string_lossy().into_owned();
            report.channels += 1;
            self.import_channel(network_id, &channel, entry.path(), force, &mut report)
                .await?;
            if report.cancelled {
                break;
            }
        }

        info!(
            network = %network_id,
            lines = report.lines_imported,
            files = report.files_imported,
            skipped = report.files_skipped,
            failed = report.files_failed,
            "network done"
        );
        Ok(report)
    }

    async fn import_channel(
        &self,
        network: &str,
        channel: &str,
        dir: &Path,
        force: bool,
        report: &mut ImportReport,
    ) -> Result<()> {
        ensure_channel(self.pool, network, channel).await?;
        debug!(network = %network, channel = %channel, "processing channel");

        let files = match list_channel_files(dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(network = %network, channel = %channel, error = %e, "cannot list log files, skipping channel");
                return Ok(());
            }
        };

        for name in &files.undated {
            debug!(network = %network, channel = %channel, file = %name, reason = "unparseable file name", "skipping file");
        }
        report.files_unparseable += files.undated.len();

        for (date, day_files) in &files.days {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.import_day(network, channel, *date, day_files, force, report)
                .await;
            if report.cancelled {
                break;
            }
        }
        Ok(())
    }

    async fn import_day(
        &self,
        network: &str,
        channel: &str,
        date: NaiveDate,
        files: &[LogFile],
        force: bool,
        report: &mut ImportReport,
    ) {
        let key = DayKey {
            network,
            channel,
            date: format_date(date),
            files: files
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
        };

        if !force {
            match self.already_imported(&key).await {
                Ok(true) => {
                    report.files_skipped += files.len();
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(network = %network, channel = %channel, files = %key.files, date = %key.date, error = %e, "import check failed");
                    report.files_failed += files.len();
                    return;
                }
            }
        }

        if files.len() > 1 {
            info!(network = %network, channel = %channel, date = %key.date, files = %key.files, "files share a date, importing as one day");
        }

        let mut texts = Vec::with_capacity(files.len());
        for file in files {
            match std::fs::read(&file.path) {
                Ok(bytes) => texts.push(String::from_utf8_lossy(&bytes).into_owned()),
                Err(source) => {
                    let err = Error::Decode {
                        path: file.path.clone(),
                        source,
                    };
                    warn!(network = %network, channel = %channel, file = %file.name, date = %key.date, error = %err, "skipping day with unreadable file");
                    report.files_failed += files.len();
                    return;
                }
            }
        }

        let entries = prepare_day(
            texts.iter().map(String::as_str),
            &self.filter,
            self.config.numbering,
        );

        match self.write_entries(&key, &entries, force).await {
            WriteOutcome::Complete(n) => {
                report.files_imported += files.len();
                report.lines_imported += n;
            }
            WriteOutcome::Failed(n) => {
                report.files_failed += files.len();
                report.lines_imported += n;
            }
            WriteOutcome::Cancelled(n) => {
                report.lines_imported += n;
                report.cancelled = true;
            }
        }
    }

    /// Already represented: any stored entry for the triple, or a manifest row.
    async fn already_imported(&self, key: &DayKey<'_>) -> Result<bool> {
        let stored = count_entries(self.pool, key.network, key.channel, &key.date).await?;
        let manifest: Option<i64> = sqlx::query_scalar(
            "SELECT entry_count FROM imported_files WHERE network_id = ? AND channel_name = ? AND log_date = ?",
        )
        .bind(key.network)
        .bind(key.channel)
        .bind(&key.date)
        .fetch_optional(self.pool)
        .await?;

        match manifest {
            Some(expected) if expected != stored => {
                warn!(
                    network = %key.network,
                    channel = %key.channel,
                    files = %key.files,
                    date = %key.date,
                    stored,
                    expected,
                    "entry count differs from import manifest; re-run with --force"
                );
            }
            None if stored > 0 => {
                warn!(
                    network = %key.network,
                    channel = %key.channel,
                    files = %key.files,
                    date = %key.date,
                    stored,
                    "entries present without an import manifest; day may be partially imported"
                );
            }
            _ => {}
        }

        let skip = stored > 0 || manifest.is_some();
        if skip {
            info!(network = %key.network, channel = %key.channel, files = %key.files, date = %key.date, "already imported");
        }
        Ok(skip)
    }

    async fn write_entries(&self, key: &DayKey<'_>, entries: &[NewLogEntry], replace: bool) -> WriteOutcome {
        // An empty day still gets one transaction for the replace and the manifest.
        let batches: Vec<&[NewLogEntry]> = if entries.is_empty() {
            vec![entries]
        } else {
            entries.chunks(self.config.batch_size).collect()
        };
        let last = batches.len() - 1;
        let mut committed = 0u64;

        for (index, batch) in batches.into_iter().enumerate() {
            if index > 0 && self.is_cancelled() {
                warn!(
                    network = %key.network,
                    channel = %key.channel,
                    files = %key.files,
                    date = %key.date,
                    committed,
                    "import interrupted mid-day"
                );
                return WriteOutcome::Cancelled(committed);
            }

            let manifest_count = (index == last).then_some(entries.len() as i64);
            if let Err(e) = self
                .write_batch(key, batch, replace && index == 0, manifest_count)
                .await
            {
                error!(
                    network = %key.network,
                    channel = %key.channel,
                    files = %key.files,
                    date = %key.date,
                    batch = index,
                    committed,
                    error = %e,
                    "batch insert failed, abandoning rest of day"
                );
                return WriteOutcome::Failed(committed);
            }
            committed += batch.len() as u64;
        }

        info!(network = %key.network, channel = %key.channel, files = %key.files, date = %key.date, lines = committed, "imported day");
        WriteOutcome::Complete(committed)
    }

    async fn write_batch(
        &self,
        key: &DayKey<'_>,
        batch: &[NewLogEntry],
        replace: bool,
        manifest_count: Option<i64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if replace {
            sqlx::query(
                "DELETE FROM log_entries WHERE network_id = ? AND channel_name = ? AND log_date = ?",
            )
            .bind(key.network)
            .bind(key.channel)
            .bind(&key.date)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "DELETE FROM imported_files WHERE network_id = ? AND channel_name = ? AND log_date = ?",
            )
            .bind(key.network)
            .bind(key.channel)
            .bind(&key.date)
            .execute(&mut *tx)
            .await?;
        }

        for entry in batch {
            sqlx::query(
                "INSERT INTO log_entries (network_id, channel_name, log_date, line_number, content) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(key.network)
            .bind(key.channel)
            .bind(&key.date)
            .bind(entry.line_number)
            .bind(&entry.content)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(count) = manifest_count {
            sqlx::query(
                r#"
                INSERT INTO imported_files (network_id, channel_name, log_date, file_name, entry_count, imported_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(network_id, channel_name, log_date) DO UPDATE SET
                    file_name = excluded.file_name,
                    entry_count = excluded.entry_count,
                    imported_at = excluded.imported_at
                "#,
            )
            .bind(key.network)
            .bind(key.channel)
            .bind(&key.date)
            .bind(&key.files)
            .bind(count)
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Filter and number the lines of one day. The texts of files sharing a
/// date are read in order as one stream, so numbering runs on from one file
/// into the next.
pub fn prepare_day<'t>(
    texts: impl IntoIterator<Item = &'t str>,
    filter: &LineFilter,
    numbering: Numbering,
) -> Vec<NewLogEntry> {
    let mut raw = 0i64;
    let mut kept = 0i64;
    let mut entries = Vec::new();
    for line in texts.into_iter().flat_map(str::lines) {
        raw += 1;
        let Some(content) = filter.apply(line) else {
            continue;
        };
        kept += 1;
        entries.push(NewLogEntry {
            line_number: match numbering {
                Numbering::Raw => raw,
                Numbering::Kept => kept,
            },
            content,
        });
    }
    entries
}

pub fn check_base_path(config: &ImportConfig) -> Result<()> {
    if !config.base_path.is_dir() {
        return Err(Error::Config(format!(
            "ZNC base path not found: {}",
            config.base_path.display()
        )));
    }
    Ok(())
}

/// Network identifiers under the base path, sorted.
pub fn discover_networks(config: &ImportConfig) -> Result<Vec<String>> {
    check_base_path(config)?;
    Ok(sorted_children(&config.base_path)?
        .into_iter()
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect())
}

/// The one named network, or every network under the base path.
fn select_networks(config: &ImportConfig, only: Option<&str>) -> Result<Vec<String>> {
    match only {
        Some(id) => {
            check_base_path(config)?;
            Ok(vec![id.to_string()])
        }
        None => discover_networks(config),
    }
}

fn list_channel_files(dir: &Path) -> std::io::Result<ChannelFiles> {
    let mut files = ChannelFiles::default();
    for entry in sorted_children(dir)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type().is_file() || !name.ends_with(LOG_SUFFIX) {
            continue;
        }
        match parse_log_date(&name) {
            Some(date) => files.days.entry(date).or_default().push(LogFile {
                path: entry.into_path(),
                name,
            }),
            None => files.undated.push(name),
        }
    }
    Ok(files)
}

/// What a dry run found in one channel directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelScan {
    pub channel: String,
    pub dated_files: usize,
    pub days: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub undated_files: Vec<String>,
    /// Dates backed by more than one file.
    pub shared_dates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkScan {
    pub network: String,
    pub log_root: PathBuf,
    pub log_root_found: bool,
    pub channels: Vec<ChannelScan>,
}

/// Walk the log tree the way an import would, without touching the database.
pub fn scan_logs(config: &ImportConfig, only: Option<&str>) -> Result<Vec<NetworkScan>> {
    let mut scans = Vec::new();
    for network in select_networks(config, only)? {
        validate_path_component("network", &network)?;
        let log_root = config.network_log_root(&network);
        let mut scan = NetworkScan {
            network,
            log_root_found: log_root.is_dir(),
            log_root,
            channels: Vec::new(),
        };
        if scan.log_root_found {
            for entry in sorted_children(&scan.log_root)?
                .into_iter()
                .filter(|e| e.file_type().is_dir())
            {
                let files = list_channel_files(entry.path())?;
                scan.channels.push(ChannelScan {
                    channel: entry.file_name().to_string_lossy().into_owned(),
                    dated_files: files.days.values().map(Vec::len).sum(),
                    days: files.days.len(),
                    first_date: files.days.keys().next().map(|d| format_date(*d)),
                    last_date: files.days.keys().next_back().map(|d| format_date(*d)),
                    shared_dates: files
                        .days
                        .iter()
                        .filter(|(_, f)| f.len() > 1)
                        .map(|(d, _)| format_date(*d))
                        .collect(),
                    undated_files: files.undated,
                });
            }
        }
        scans.push(scan);
    }
    Ok(scans)
}

/// Reject names that would escape the directory they are joined onto.
fn validate_path_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
    {
        return Err(Error::validation(format!("invalid {} name: {:?}", what, value)));
    }
    Ok(())
}

fn sorted_children(dir: &Path) -> std::io::Result<Vec<DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, walkdir::Error>>()
        .map_err(std::io::Error::from)
}

async fn upsert_network(pool: &SqlitePool, id: &str, display_name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO networks (id, display_name) VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name
        "#,
    )
    .bind(id)
    .bind(display_name)
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_channel(pool: &SqlitePool, network: &str, channel: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO channels (network_id, name) VALUES (?, ?)")
        .bind(network)
        .bind(channel)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_entries(pool: &SqlitePool, network: &str, channel: &str, date: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM log_entries WHERE network_id = ? AND channel_name = ? AND log_date = ?",
    )
    .bind(network)
    .bind(channel)
    .bind(date)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn record_import_time(pool: &SqlitePool) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO import_metadata (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(LAST_IMPORT_KEY)
    .bind(now.to_rfc3339())
    .bind(now.timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// CLI entry point for `znc-search import`.
pub async fn run_import(config: &Config, network: Option<&str>, force: bool) -> anyhow::Result<()> {
    check_base_path(&config.import)?;
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current batch");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    println!("Scanning ZNC logs from: {}", config.import.base_path.display());
    let importer = Importer::new(&pool, &config.import).with_cancel_flag(cancel);
    let reports = importer.import_selected(network, force).await?;

    let mut new_lines = 0u64;
    for report in &reports {
        println!("import {}", report.network);
        println!("  channels: {}", report.channels);
        println!("  files imported: {}", report.files_imported);
        println!("  files skipped (already imported): {}", report.files_skipped);
        if report.files_unparseable > 0 {
            println!("  files skipped (no date in name): {}", report.files_unparseable);
        }
        if report.files_failed > 0 {
            println!("  files failed: {}", report.files_failed);
        }
        println!("  lines imported: {}", report.lines_imported);
        new_lines += report.lines_imported;
    }

    record_import_time(&pool).await?;
    let summary = stats::collect_stats(&pool).await?;

    println!();
    println!("Import complete");
    println!("  new lines imported: {}", new_lines);
    println!("  total lines in database: {}", summary.total_entries);
    println!("  networks: {}", summary.network_count);
    println!("  channels: {}", summary.channel_count);
    if let (Some(start), Some(end)) = (&summary.date_range.start, &summary.date_range.end) {
        println!("  date range: {} to {}", start, end);
    }
    if reports.iter().any(|r| r.cancelled) {
        println!("interrupted");
    } else {
        println!("ok");
    }

    pool.close().await;
    Ok(())
}

/// CLI entry point for `znc-search import --dry-run`.
pub fn run_scan(config: &Config, network: Option<&str>) -> anyhow::Result<()> {
    let scans = scan_logs(&config.import, network)?;

    println!("Scanning ZNC logs from: {}", config.import.base_path.display());
    for scan in &scans {
        if !scan.log_root_found {
            println!("network {}: no log directory at {}", scan.network, scan.log_root.display());
            continue;
        }
        println!("network {} ({})", scan.network, scan.log_root.display());
        for ch in &scan.channels {
            match (&ch.first_date, &ch.last_date) {
                (Some(first), Some(last)) => println!(
                    "  {}: {} dated files, {} days ({} to {})",
                    ch.channel, ch.dated_files, ch.days, first, last
                ),
                _ => println!("  {}: no dated log files", ch.channel),
            }
            for name in &ch.undated_files {
                println!("    no date in name: {}", name);
            }
            for date in &ch.shared_dates {
                println!("    several files for {}", date);
            }
        }
    }
    println!("dry run, nothing written");
    Ok(())
}
