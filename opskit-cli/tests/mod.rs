use chrono::{TimeZone, Utc};
use opskit_cli::record::{record_run, COMPONENT};
use opskit_cli::{run, MigrateConfig, RelationResult, RunOptions, RunSummary};
use opskit_core::{catalog, describe_relation, EnsurePolicy, Outcome};
use rusqlite::Connection;

fn open() -> Connection {
    Connection::open_in_memory().unwrap()
}

const FILLS_CONFIG: &str = r#"
db_path = "data/pipeline.db"
busy_timeout_ms = 250

[[relations]]
name = "fills_daily"
columns = [
    { name = "id", type = "INTEGER", primary_key = true },
    { name = "symbol", type = "TEXT", nullable = false, default = { literal = "''" } },
    { name = "qty", type = "real" },
]
indexes = [{ name = "idx_fills_daily_symbol", keys = ["symbol"] }]
"#;

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = MigrateConfig::from_toml("").unwrap();
    assert_eq!(config, MigrateConfig::default());
    assert_eq!(config.db_path, None);
    assert_eq!(config.busy_timeout_ms, 5000);
    assert!(config.create_missing);
    assert!(!config.record);
}

#[test]
fn test_config_parses_relations() {
    let config = MigrateConfig::from_toml(FILLS_CONFIG).unwrap();
    assert_eq!(config.busy_timeout_ms, 250);
    assert_eq!(config.relations.len(), 1);

    let fills = &config.relations[0];
    assert_eq!(fills.name(), "fills_daily");
    assert_eq!(fills.schema.columns.len(), 3);
    assert!(fills.schema.columns[0].primary_key);
    assert!(!fills.schema.columns[1].nullable);
    assert!(fills.schema.columns[2].nullable);
    assert_eq!(fills.indexes[0].keys, vec!["symbol"]);
}

#[test]
fn test_config_rejects_redeclared_catalog_relation() {
    let toml = r#"
[[relations]]
name = "OPS_LOG"
columns = [{ name = "id", type = "INTEGER" }]
"#;
    let err = MigrateConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("built in"));
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, FILLS_CONFIG).unwrap();

    let config = MigrateConfig::load(Some(&path)).unwrap();
    assert_eq!(config.relations[0].name(), "fills_daily");

    let missing = dir.path().join("absent.toml");
    assert!(MigrateConfig::load(Some(&missing)).is_err());
}

#[test]
fn test_config_select() {
    let config = MigrateConfig::from_toml(FILLS_CONFIG).unwrap();

    let all: Vec<String> = config
        .select(&[])
        .unwrap()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(all, vec!["ops_log", "alert_log", "latency_probe", "fills_daily"]);

    let picked = config
        .select(&["FILLS_DAILY".to_string(), "ops_log".to_string()])
        .unwrap();
    assert_eq!(picked[0].name(), "fills_daily");
    assert_eq!(picked[1].name(), "ops_log");

    let err = config.select(&["notion_sync".to_string()]).unwrap_err();
    assert!(err.to_string().contains("unknown relation `notion_sync`"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_run_creates_then_is_idempotent() {
    let mut conn = open();
    let config = MigrateConfig::from_toml(FILLS_CONFIG).unwrap();
    let manifests = config.select(&[]).unwrap();

    let first = run(&mut conn, &manifests, RunOptions::default());
    assert!(first.is_success());
    assert_eq!(first.results.len(), 4);
    assert_eq!(first.relations_where(|o| matches!(o, Outcome::Created(_))).len(), 4);

    let second = run(&mut conn, &manifests, RunOptions::default());
    assert_eq!(second.applied_total(), 0);
    assert_eq!(second.relations_where(Outcome::is_noop).len(), 4);
    assert!(second.render_text().starts_with("[OK] ops_log\n"));
}

#[test]
fn test_run_continues_after_failure() {
    let mut conn = open();
    conn.execute_batch("CREATE TABLE alert_log (id INTEGER PRIMARY KEY);")
        .unwrap();

    // alert_log is missing NOT NULL columns without defaults, which SQLite
    // cannot add; the other relations must still be created.
    let summary = run(&mut conn, &catalog::all(), RunOptions::default());
    assert!(!summary.is_success());
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.failed_relations(), vec!["alert_log"]);
    assert!(matches!(summary.results[0], RelationResult::Ensured(_)));
    assert!(matches!(summary.results[2], RelationResult::Ensured(_)));

    let text = summary.render_text();
    assert!(text.contains("[CREATED] ops_log"));
    assert!(text.contains("[ERROR] alert_log:"));
    assert!(text.contains("[CREATED] latency_probe"));
}

#[test]
fn test_run_without_create() {
    let mut conn = open();
    let opts = RunOptions {
        dry_run: false,
        policy: EnsurePolicy {
            create_missing: false,
        },
    };

    let summary = run(&mut conn, &[catalog::ops_log()], opts);
    match &summary.results[0] {
        RelationResult::Failed { recoverable, .. } => assert!(*recoverable),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_dry_run_changes_nothing() {
    let mut conn = open();
    conn.execute_batch("CREATE TABLE ops_log (id INTEGER PRIMARY KEY, ts_utc TEXT);")
        .unwrap();
    let before = describe_relation(&conn, "ops_log").unwrap();

    let opts = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let summary = run(&mut conn, &[catalog::ops_log(), catalog::alert_log()], opts);

    assert_eq!(describe_relation(&conn, "ops_log").unwrap(), before);
    assert!(describe_relation(&conn, "alert_log").is_err());
    assert_eq!(summary.applied_total(), 0);

    match &summary.results[0] {
        RelationResult::Planned {
            statements,
            creates_relation,
            ..
        } => {
            assert!(!creates_relation);
            // Five columns plus idx_ops_log_ts.
            assert_eq!(statements.len(), 6);
            assert!(statements[0].starts_with("ALTER TABLE \"ops_log\" ADD COLUMN \"component\""));
        }
        other => panic!("expected a plan, got {other:?}"),
    }

    let text = summary.render_text();
    assert!(text.contains("[PLAN] ops_log: 6 statement(s)\n"));
    assert!(text.contains("[PLAN] alert_log: 2 statement(s), creates relation\n"));
    assert!(text.contains("(dry run)"));
}

#[test]
fn test_drift_is_reported() {
    let mut conn = open();
    conn.execute_batch(
        "CREATE TABLE latency_probe (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             ts_utc TEXT NOT NULL,
             target TEXT NOT NULL,
             latency_ms TEXT,
             ok INTEGER NOT NULL DEFAULT 1,
             detail TEXT
         );",
    )
    .unwrap();

    let summary = run(&mut conn, &[catalog::latency_probe()], RunOptions::default());
    assert!(summary.is_success());
    assert_eq!(summary.drift_count(), 1);
    assert!(summary
        .render_text()
        .contains("[DRIFT] latency_probe: column `latency_ms`"));
}

#[test]
fn test_summary_json() {
    let mut conn = open();
    let summary = run(&mut conn, &[catalog::ops_log()], RunOptions::default());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["dry_run"], false);
    assert_eq!(json["results"][0]["status"], "ensured");
    assert_eq!(json["results"][0]["relation"], "ops_log");
    assert_eq!(json["results"][0]["outcome"], "created");
    assert_eq!(json["results"][0]["applied"]["relations_created"], 1);
}

// ============================================================================
// ops_log Record Tests
// ============================================================================

#[test]
fn test_record_run_writes_summary_row() {
    let mut conn = open();
    let summary = run(&mut conn, &catalog::all(), RunOptions::default());
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();

    let id = record_run(&mut conn, &summary, now, EnsurePolicy::default())
        .unwrap()
        .unwrap();

    let (ts, component, status, rows, warns, extra): (String, String, String, i64, i64, String) =
        conn.query_row(
            "SELECT ts_utc, component, status, rows, warns, extra FROM ops_log WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .unwrap();

    assert_eq!(ts, "2026-03-01T09:30:00Z");
    assert_eq!(component, COMPONENT);
    assert_eq!(status, "ok");
    assert_eq!(rows as usize, summary.applied_total());
    assert_eq!(warns, 0);

    let extra: serde_json::Value = serde_json::from_str(&extra).unwrap();
    assert_eq!(extra["relations"], 3);
    assert_eq!(extra["created"][0], "ops_log");
    assert_eq!(extra["failed"].as_array().unwrap().len(), 0);
}

#[test]
fn test_record_run_creates_ops_log_and_marks_errors() {
    let mut conn = open();
    let mut summary = RunSummary::new(false);
    summary.push(RelationResult::Failed {
        relation: "alert_log".to_string(),
        error: "boom".to_string(),
        recoverable: false,
    });

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
    record_run(&mut conn, &summary, now, EnsurePolicy::default()).unwrap();

    let (status, warns): (String, i64) = conn
        .query_row("SELECT status, warns FROM ops_log", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(status, "error");
    assert_eq!(warns, 1);
}

#[test]
fn test_record_run_respects_no_create() {
    let mut conn = open();
    let summary = RunSummary::new(false);
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
    let policy = EnsurePolicy {
        create_missing: false,
    };

    let id = record_run(&mut conn, &summary, now, policy).unwrap();
    assert_eq!(id, None);
    assert!(describe_relation(&conn, "ops_log").is_err());

    // Once ops_log exists, the same policy records normally.
    run(&mut conn, &[catalog::ops_log()], RunOptions::default());
    assert!(record_run(&mut conn, &summary, now, policy).unwrap().is_some());
}
