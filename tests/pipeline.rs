//! End-to-end tests of the import pipeline, the query layer, and the HTTP
//! API, driven through the library against a temporary ZNC tree.

use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use znc_search::auth;
use znc_search::browse::{list_channels, list_networks};
use znc_search::config::{Config, LineMode, Numbering};
use znc_search::context::{get_context, ContextRequest};
use znc_search::db;
use znc_search::error::Error;
use znc_search::ingest::{self, Importer};
use znc_search::migrate;
use znc_search::search::{search_entries, MatchMode, SearchRequest};
use znc_search::server::run_server;
use znc_search::stats::collect_stats;

// ─── Fixtures ───────────────────────────────────────────────────────

fn write_log(base: &Path, network: &str, channel: &str, file: &str, lines: &[&str]) {
    let dir = base.join(network).join("moddata/log").join(channel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), format!("{}\n", lines.join("\n"))).unwrap();
}

/// Two networks, one private-message log, and files the importer must skip.
fn write_fixture(base: &Path) {
    write_log(
        base,
        "libera",
        "#rust",
        "2025-01-01.log",
        &[
            "[08:00:00] *** Joins: bob",
            "[08:00:05] <bob> hello",
            "[08:00:10] <NickServ> notice",
        ],
    );
    write_log(
        base,
        "libera",
        "#rust",
        "2025-01-02.log",
        &[
            "[09:00:00] <alice> say hello world now",
            "[09:00:05] <bob> borrow checker wins",
            "[09:00:10] <carol> hello again",
            "[09:00:15] <dave> 100% sure",
        ],
    );
    write_log(base, "libera", "#rust", "readme.log", &["not a dated log"]);
    fs::write(
        base.join("libera/moddata/log/#rust/notes.txt"),
        "ignored entirely",
    )
    .unwrap();
    write_log(
        base,
        "libera",
        "alice",
        "2025-01-02.log",
        &["[10:00:00] <alice> private hello"],
    );
    write_log(
        base,
        "oftc",
        "#debian",
        "#debian_20250103.log",
        &["[11:00:00] <erin> hello debian"],
    );
}

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let root = tmp.path().display();
    let config_content = format!(
        r#"[db]
path = "{root}/data/znc.sqlite"

[import]
base_path = "{root}/znc"
batch_size = 2

[server]
bind = "127.0.0.1:{port}"
"#
    );
    toml::from_str(&config_content).unwrap()
}

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    write_fixture(&tmp.path().join("znc"));
    let cfg = test_config(&tmp, 0);
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, cfg, pool)
}

async fn entry_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
        .fetch_one(pool)
        .await
        .unwrap()
}

fn search(network: &str, query: &str) -> SearchRequest {
    SearchRequest {
        network: network.to_string(),
        query: query.to_string(),
        ..Default::default()
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Import ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_file_imports_single_line() {
    let (_tmp, cfg, pool) = setup().await;
    let report = Importer::new(&pool, &cfg.import)
        .import_network("libera", false)
        .await
        .unwrap();

    assert_eq!(report.channels, 2);
    assert_eq!(report.files_imported, 3);
    assert_eq!(report.files_unparseable, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.lines_imported, 6);

    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT line_number, content FROM log_entries WHERE network_id = 'libera' AND channel_name = '#rust' AND log_date = '2025-01-01'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows, vec![(2, "<bob> hello".to_string())]);
}

#[tokio::test]
async fn test_reimport_without_force_is_noop() {
    let (_tmp, cfg, pool) = setup().await;
    let importer = Importer::new(&pool, &cfg.import);

    importer.import_selected(None, false).await.unwrap();
    let before = entry_count(&pool).await;

    let reports = importer.import_selected(None, false).await.unwrap();
    assert_eq!(entry_count(&pool).await, before);
    assert!(reports.iter().all(|r| r.lines_imported == 0));
    assert_eq!(reports.iter().map(|r| r.files_skipped).sum::<usize>(), 4);
}

#[tokio::test]
async fn test_force_reimport_replaces_without_duplicates() {
    let (_tmp, cfg, pool) = setup().await;
    let importer = Importer::new(&pool, &cfg.import);

    importer.import_selected(None, false).await.unwrap();
    let snapshot: Vec<(String, String, i64, String)> = sqlx::query_as(
        "SELECT channel_name, log_date, line_number, content FROM log_entries ORDER BY channel_name, log_date, line_number",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    let reports = importer.import_all(true).await.unwrap();
    assert_eq!(reports.iter().map(|r| r.lines_imported).sum::<u64>(), 7);

    let after: Vec<(String, String, i64, String)> = sqlx::query_as(
        "SELECT channel_name, log_date, line_number, content FROM log_entries ORDER BY channel_name, log_date, line_number",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(snapshot, after);

    // The full-text index follows the replacement.
    let hits = search_entries(&pool, &search("libera", "borrow"), 100)
        .await
        .unwrap();
    assert_eq!(hits.total, 1);
}

#[tokio::test]
async fn test_single_network_import() {
    let (_tmp, cfg, pool) = setup().await;
    let reports = Importer::new(&pool, &cfg.import)
        .import_selected(Some("oftc"), false)
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].network, "oftc");
    assert_eq!(entry_count(&pool).await, 1);
}

#[tokio::test]
async fn test_missing_network_directory_is_skipped() {
    let (_tmp, cfg, pool) = setup().await;
    let report = Importer::new(&pool, &cfg.import)
        .import_network("efnet", false)
        .await
        .unwrap();
    assert_eq!(report.files_imported, 0);
    assert_eq!(entry_count(&pool).await, 0);
}

#[tokio::test]
async fn test_missing_base_path_is_config_error() {
    let (tmp, mut cfg, pool) = setup().await;
    cfg.import.base_path = tmp.path().join("nowhere");
    let err = Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_network_id_cannot_escape_base_path() {
    let (_tmp, cfg, pool) = setup().await;
    let err = Importer::new(&pool, &cfg.import)
        .import_network("../libera", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_verbatim_mode_keeps_every_line() {
    let (_tmp, mut cfg, pool) = setup().await;
    cfg.import.line_mode = LineMode::Verbatim;
    Importer::new(&pool, &cfg.import)
        .import_network("libera", false)
        .await
        .unwrap();

    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT line_number, content FROM log_entries WHERE channel_name = '#rust' AND log_date = '2025-01-01' ORDER BY line_number",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], (1, "[08:00:00] *** Joins: bob".to_string()));
    assert_eq!(rows[2], (3, "[08:00:10] <NickServ> notice".to_string()));
}

#[tokio::test]
async fn test_kept_numbering_is_dense() {
    let (_tmp, mut cfg, pool) = setup().await;
    cfg.import.numbering = Numbering::Kept;
    Importer::new(&pool, &cfg.import)
        .import_network("libera", false)
        .await
        .unwrap();

    let line: i64 = sqlx::query_scalar(
        "SELECT line_number FROM log_entries WHERE channel_name = '#rust' AND log_date = '2025-01-01'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(line, 1);
}

#[tokio::test]
async fn test_manifest_records_entry_counts() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let manifest: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT channel_name, log_date, entry_count FROM imported_files WHERE network_id = 'libera' ORDER BY channel_name, log_date",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        manifest,
        vec![
            ("#rust".to_string(), "2025-01-01".to_string(), 1),
            ("#rust".to_string(), "2025-01-02".to_string(), 4),
            ("alice".to_string(), "2025-01-02".to_string(), 1),
        ]
    );
}

async fn setup_tree(write: impl FnOnce(&Path)) -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("znc");
    fs::create_dir_all(&base).unwrap();
    write(&base);
    let cfg = test_config(&tmp, 0);
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, cfg, pool)
}

async fn day_rows(pool: &SqlitePool, date: &str) -> Vec<(i64, String)> {
    sqlx::query_as(
        "SELECT line_number, content FROM log_entries WHERE channel_name = '#rust' AND log_date = ? ORDER BY line_number",
    )
    .bind(date)
    .fetch_all(pool)
    .await
    .unwrap()
}

fn write_same_day_pair(base: &Path) {
    write_log(
        base,
        "libera",
        "#rust",
        "2025-01-01.log",
        &["[08:00:00] <a> from dashed file"],
    );
    write_log(
        base,
        "libera",
        "#rust",
        "#rust_20250101.log",
        &["[08:00:00] <b> from compact file"],
    );
}

#[tokio::test]
async fn test_files_sharing_a_date_import_as_one_day() {
    let (_tmp, cfg, pool) = setup_tree(write_same_day_pair).await;
    let importer = Importer::new(&pool, &cfg.import);
    let expected = vec![
        (1, "<b> from compact file".to_string()),
        (2, "<a> from dashed file".to_string()),
    ];

    let report = importer.import_network("libera", false).await.unwrap();
    assert_eq!(report.files_imported, 2);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.lines_imported, 2);
    assert_eq!(day_rows(&pool, "2025-01-01").await, expected);

    let report = importer.import_network("libera", false).await.unwrap();
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.lines_imported, 0);

    // Forcing replaces the day once, so neither file's rows are lost.
    let report = importer.import_network("libera", true).await.unwrap();
    assert_eq!(report.files_imported, 2);
    assert_eq!(report.lines_imported, 2);
    assert_eq!(day_rows(&pool, "2025-01-01").await, expected);

    let files: String = sqlx::query_scalar("SELECT file_name FROM imported_files")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(files, "#rust_20250101.log,2025-01-01.log");
}

#[tokio::test]
async fn test_invalid_utf8_is_replaced_not_fatal() {
    let (_tmp, cfg, pool) = setup_tree(|base| {
        let dir = base.join("libera/moddata/log/#rust");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("2025-01-01.log"),
            b"[08:00:00] <bob> caf\xff\xfe ok\n[08:00:05] <bob> fine\n",
        )
        .unwrap();
    })
    .await;

    let report = Importer::new(&pool, &cfg.import)
        .import_network("libera", false)
        .await
        .unwrap();
    assert_eq!(report.files_imported, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(
        day_rows(&pool, "2025-01-01").await,
        vec![
            (1, "<bob> caf\u{FFFD}\u{FFFD} ok".to_string()),
            (2, "<bob> fine".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_batch_abandons_rest_of_day_only() {
    let (_tmp, cfg, pool) = setup_tree(|base| {
        write_log(
            base,
            "libera",
            "#rust",
            "2025-01-01.log",
            &[
                "[08:00:00] <a> one",
                "[08:00:01] <a> two",
                "[08:00:02] <a> poison",
                "[08:00:03] <a> four",
            ],
        );
        write_log(
            base,
            "libera",
            "#rust",
            "2025-01-02.log",
            &["[09:00:00] <a> next day"],
        );
    })
    .await;
    sqlx::query(
        r#"
        CREATE TRIGGER reject_poison BEFORE INSERT ON log_entries
        WHEN new.content LIKE '%poison%'
        BEGIN
            SELECT RAISE(ABORT, 'rejected');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    // batch_size = 2: the first batch commits, the second fails.
    let report = Importer::new(&pool, &cfg.import)
        .import_network("libera", false)
        .await
        .unwrap();
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_imported, 1);
    assert_eq!(report.lines_imported, 3);

    assert_eq!(
        day_rows(&pool, "2025-01-01").await,
        vec![(1, "<a> one".to_string()), (2, "<a> two".to_string())]
    );
    assert_eq!(
        day_rows(&pool, "2025-01-02").await,
        vec![(1, "<a> next day".to_string())]
    );

    let manifest_dates: Vec<String> =
        sqlx::query_scalar("SELECT log_date FROM imported_files ORDER BY log_date")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(manifest_dates, vec!["2025-01-02"]);
}

#[tokio::test]
async fn test_scan_reports_without_writing() {
    let (_tmp, cfg, pool) = setup_tree(|base| {
        write_fixture(base);
        write_log(
            base,
            "libera",
            "#rust",
            "#rust_20250101.log",
            &["[08:00:00] <b> compact"],
        );
    })
    .await;

    let scans = ingest::scan_logs(&cfg.import, None).unwrap();
    let names: Vec<&str> = scans.iter().map(|s| s.network.as_str()).collect();
    assert_eq!(names, vec!["libera", "oftc"]);

    let libera = &scans[0];
    assert!(libera.log_root_found);
    let channels: Vec<&str> = libera.channels.iter().map(|c| c.channel.as_str()).collect();
    assert_eq!(channels, vec!["#rust", "alice"]);

    let rust = &libera.channels[0];
    assert_eq!(rust.dated_files, 3);
    assert_eq!(rust.days, 2);
    assert_eq!(rust.first_date.as_deref(), Some("2025-01-01"));
    assert_eq!(rust.last_date.as_deref(), Some("2025-01-02"));
    assert_eq!(rust.undated_files, vec!["readme.log"]);
    assert_eq!(rust.shared_dates, vec!["2025-01-01"]);

    let missing = ingest::scan_logs(&cfg.import, Some("efnet")).unwrap();
    assert!(!missing[0].log_root_found);
    assert!(missing[0].channels.is_empty());

    assert_eq!(entry_count(&pool).await, 0);
}

// ─── Search ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_word_uses_full_text() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let resp = search_entries(&pool, &search("libera", "hello"), 1000)
        .await
        .unwrap();
    assert_eq!(resp.mode, MatchMode::FullText);
    assert_eq!(resp.total, 4);
    assert!(!resp.truncated);

    // Newest day first, line order within a day.
    assert_eq!(resp.results[0].date, "2025-01-02");
    assert_eq!(resp.results[0].line, 1);
    let last = resp.results.last().unwrap();
    assert_eq!((last.date.as_str(), last.line), ("2025-01-01", 2));
    assert_eq!(last.content, "<bob> hello");
    assert_eq!(last.network, "Libera");
    assert_eq!(last.network_id, "libera");

    // Networks do not leak into each other.
    let resp = search_entries(&pool, &search("oftc", "hello"), 1000)
        .await
        .unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].channel, "#debian");
    assert_eq!(resp.results[0].date, "2025-01-03");
}

#[tokio::test]
async fn test_phrase_uses_substring() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let resp = search_entries(&pool, &search("libera", "hello world"), 1000)
        .await
        .unwrap();
    assert_eq!(resp.mode, MatchMode::Substring);
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].content, "<alice> say hello world now");

    let resp = search_entries(&pool, &search("libera", "HELLO WORLD"), 1000)
        .await
        .unwrap();
    assert_eq!(resp.total, 1);

    // `%` is literal, not a wildcard.
    let resp = search_entries(&pool, &search("libera", "100%"), 1000)
        .await
        .unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].content, "<dave> 100% sure");
    let resp = search_entries(&pool, &search("libera", "h%o"), 1000)
        .await
        .unwrap();
    assert_eq!(resp.total, 0);
}

#[tokio::test]
async fn test_filters_apply_in_both_modes() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let mut req = search("libera", "hello");
    req.channel = Some("#rust".to_string());
    assert_eq!(search_entries(&pool, &req, 1000).await.unwrap().total, 3);

    req.start_date = Some("2025-01-02".to_string());
    assert_eq!(search_entries(&pool, &req, 1000).await.unwrap().total, 2);

    req.start_date = None;
    req.end_date = Some("2025-01-01".to_string());
    assert_eq!(search_entries(&pool, &req, 1000).await.unwrap().total, 1);

    let mut req = search("libera", "<bob>");
    req.channel = Some("#rust".to_string());
    req.start_date = Some("2025-01-02".to_string());
    let resp = search_entries(&pool, &req, 1000).await.unwrap();
    assert_eq!(resp.mode, MatchMode::Substring);
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].content, "<bob> borrow checker wins");
}

#[tokio::test]
async fn test_results_capped_and_flagged() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let resp = search_entries(&pool, &search("libera", "hello"), 2)
        .await
        .unwrap();
    assert_eq!(resp.results.len(), 2);
    assert_eq!(resp.total, 2);
    assert!(resp.truncated);

    let resp = search_entries(&pool, &search("libera", "hello"), 4)
        .await
        .unwrap();
    assert_eq!(resp.total, 4);
    assert!(!resp.truncated);

    // A zero cap still returns one hit rather than lifting the limit.
    let resp = search_entries(&pool, &search("libera", "hello"), 0)
        .await
        .unwrap();
    assert_eq!(resp.results.len(), 1);
    assert!(resp.truncated);
}

#[tokio::test]
async fn test_search_validation() {
    let (_tmp, _cfg, pool) = setup().await;
    let err = search_entries(&pool, &search("libera", "  "), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = search_entries(&pool, &search("", "hello"), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

// ─── Context ────────────────────────────────────────────────────────

fn context_req(date: &str, line: i64, before: Option<i64>, after: Option<i64>) -> ContextRequest {
    ContextRequest {
        network: "libera".to_string(),
        channel: "#rust".to_string(),
        date: date.to_string(),
        line,
        lines_before: before,
        lines_after: after,
    }
}

#[tokio::test]
async fn test_context_window_bounds() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let window = get_context(&pool, &context_req("2025-01-02", 2, Some(1), Some(1)), &cfg.search)
        .await
        .unwrap();
    assert_eq!((window.start_line, window.end_line), (1, 3));
    assert_eq!(window.total_lines, 4);
    let lines: Vec<i64> = window.context.iter().map(|l| l.line).collect();
    assert_eq!(lines, vec![1, 2, 3]);
    assert_eq!(
        window.context.iter().filter(|l| l.is_match).map(|l| l.line).collect::<Vec<_>>(),
        vec![2]
    );
    assert!(!window.can_expand_up);
    assert!(window.can_expand_down);

    let window = get_context(&pool, &context_req("2025-01-02", 4, None, None), &cfg.search)
        .await
        .unwrap();
    assert_eq!((window.start_line, window.end_line), (2, 6));
    assert_eq!(window.context.len(), 3);
    assert!(window.can_expand_up);
    assert!(!window.can_expand_down);
}

#[tokio::test]
async fn test_context_skips_gaps_from_discarded_lines() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let window = get_context(&pool, &context_req("2025-01-01", 2, None, None), &cfg.search)
        .await
        .unwrap();
    assert_eq!(window.total_lines, 2);
    assert_eq!(window.context.len(), 1);
    assert!(window.context[0].is_match);
    assert_eq!(window.context[0].content, "<bob> hello");
    assert!(!window.can_expand_up);
    assert!(!window.can_expand_down);
}

#[tokio::test]
async fn test_context_window_is_capped() {
    let (_tmp, mut cfg, pool) = setup().await;
    cfg.search.max_context = 1;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let window = get_context(&pool, &context_req("2025-01-02", 3, Some(100), Some(100)), &cfg.search)
        .await
        .unwrap();
    assert_eq!((window.start_line, window.end_line), (2, 4));
}

#[tokio::test]
async fn test_context_for_missing_file_is_not_found() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();

    let err = get_context(&pool, &context_req("2024-06-01", 1, None, None), &cfg.search)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ─── Browse & stats ─────────────────────────────────────────────────

#[tokio::test]
async fn test_browse_lists() {
    let (_tmp, cfg, pool) = setup().await;
    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();
    // A network row with no entries stays hidden.
    Importer::new(&pool, &cfg.import)
        .import_network("efnet", false)
        .await
        .unwrap();

    let networks = list_networks(&pool).await.unwrap();
    let names: Vec<&str> = networks.iter().map(|n| n.display_name.as_str()).collect();
    assert_eq!(names, vec!["Libera", "Oftc"]);

    assert_eq!(list_channels(&pool, "libera").await.unwrap(), vec!["#rust"]);
    assert!(list_channels(&pool, "efnet").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_summary() {
    let (_tmp, cfg, pool) = setup().await;
    let empty = collect_stats(&pool).await.unwrap();
    assert_eq!(empty.total_entries, 0);
    assert_eq!(empty.date_range.start, None);
    assert_eq!(empty.last_import, None);

    Importer::new(&pool, &cfg.import)
        .import_selected(None, false)
        .await
        .unwrap();
    ingest::record_import_time(&pool).await.unwrap();

    let stats = collect_stats(&pool).await.unwrap();
    assert_eq!(stats.total_entries, 7);
    assert_eq!(stats.network_count, 2);
    assert_eq!(stats.channel_count, 2);
    assert_eq!(stats.date_range.start.as_deref(), Some("2025-01-01"));
    assert_eq!(stats.date_range.end.as_deref(), Some("2025-01-03"));
    assert_eq!(stats.networks[0].network, "Libera");
    assert_eq!(stats.networks[0].count, 6);
    assert!(stats.last_import.is_some());
}

// ─── HTTP API ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_api_requires_login() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    write_fixture(&tmp.path().join("znc"));
    let cfg = test_config(&tmp, port);

    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    auth::add_user(&pool, "alice", "s3cret-pw").await.unwrap();
    Importer::new(&pool, &cfg.import)
        .import_network("libera", false)
        .await
        .unwrap();
    pool.close().await;

    let cfg_clone = cfg.clone();
    let server_handle = tokio::spawn(async move {
        run_server(&cfg_clone).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    // No token.
    let resp = client
        .post(format!("{}/api/search", base))
        .json(&json!({"network": "libera", "query": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    // Wrong password.
    let resp = client
        .post(format!("{}/api/login", base))
        .json(&json!({"username": "alice", "password": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{}/api/login", base))
        .json(&json!({"username": "alice", "password": "s3cret-pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/search", base))
        .bearer_auth(&token)
        .json(&json!({"network": "libera", "query": "hello world"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["mode"], "substring");
    assert_eq!(body["total"], 1);
    assert_eq!(body["truncated"], false);
    assert_eq!(body["results"][0]["line"], 1);

    let resp = client
        .post(format!("{}/api/search", base))
        .bearer_auth(&token)
        .json(&json!({"network": "libera", "query": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/api/context", base))
        .bearer_auth(&token)
        .json(&json!({"network": "libera", "channel": "#rust", "date": "2025-01-01", "line": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["context"][0]["content"], "<bob> hello");
    assert_eq!(body["context"][0]["is_match"], true);
    assert_eq!(body["can_expand_down"], false);

    let resp = client
        .post(format!("{}/api/context", base))
        .bearer_auth(&token)
        .json(&json!({"network": "libera", "channel": "#rust", "date": "1999-01-01", "line": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // The largest line number still yields a well-formed window.
    let resp = client
        .post(format!("{}/api/context", base))
        .bearer_auth(&token)
        .json(&json!({"network": "libera", "channel": "#rust", "date": "2025-01-01", "line": i64::MAX}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["end_line"], i64::MAX);
    assert_eq!(body["can_expand_down"], false);
    assert_eq!(body["context"], json!([]));

    let resp = client
        .get(format!("{}/api/networks", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([{"id": "libera", "name": "Libera"}]));

    let resp = client
        .get(format!("{}/api/channels/libera", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!(["#rust"]));

    let resp = client
        .post(format!("{}/api/import", base))
        .bearer_auth(&token)
        .json(&json!({"network": "oftc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["network"], "oftc");
    assert_eq!(body["lines_imported"], 1);

    let resp = client
        .post(format!("{}/api/import", base))
        .bearer_auth(&token)
        .json(&json!({"network": "../etc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/api/stats", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total_entries"], 7);
    assert!(body["last_import"].is_string());

    // Account endpoints act on the signed-in user.
    let resp = client
        .get(format!("{}/api/user/info", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["username"], "alice");

    let resp = client
        .post(format!("{}/api/user/password", base))
        .bearer_auth(&token)
        .json(&json!({"current_password": "wrong-one", "new_password": "n3w-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{}/api/user/password", base))
        .bearer_auth(&token)
        .json(&json!({"current_password": "s3cret-pw", "new_password": "short"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/user/password", base))
        .bearer_auth(&token)
        .json(&json!({"current_password": "s3cret-pw", "new_password": "n3w-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/api/login", base))
        .json(&json!({"username": "alice", "password": "s3cret-pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let resp = client
        .post(format!("{}/api/login", base))
        .json(&json!({"username": "alice", "password": "n3w-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/api/logout", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/api/stats", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    server_handle.abort();
}
