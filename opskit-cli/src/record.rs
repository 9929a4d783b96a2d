//! Journal a run into `ops_log`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use opskit_core::{catalog, ensure_with, EnsurePolicy, Outcome, ReconcileError};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::warn;

use crate::report::RunSummary;

pub const COMPONENT: &str = "schema_reconciler";

/// The JSON kept in `ops_log.extra`.
#[derive(Debug, Serialize)]
struct RunExtra {
    relations: usize,
    created: Vec<String>,
    migrated: Vec<String>,
    failed: Vec<String>,
    drift: usize,
}

/// Append one `ops_log` row summarizing `summary`, making sure `ops_log`
/// itself is in shape first under the same `policy` as the run.
///
/// Returns the new row id, or `None` when `ops_log` does not exist and the
/// policy forbids creating it.
pub fn record_run(
    conn: &mut Connection,
    summary: &RunSummary,
    now: DateTime<Utc>,
    policy: EnsurePolicy,
) -> Result<Option<i64>> {
    let ops_log = catalog::ops_log();
    match ensure_with(conn, &ops_log.schema, &ops_log.indexes, policy) {
        Ok(_) => {}
        Err(ReconcileError::RelationNotFound(_)) => {
            warn!("ops_log does not exist and creation is disabled; run not recorded");
            return Ok(None);
        }
        Err(e) => return Err(e).context("preparing ops_log"),
    }

    let extra = RunExtra {
        relations: summary.results.len(),
        created: summary.relations_where(|o| matches!(o, Outcome::Created(_))),
        migrated: summary.relations_where(|o| matches!(o, Outcome::Migrated(_))),
        failed: summary.failed_relations(),
        drift: summary.drift_count(),
    };
    let status = if summary.is_success() { "ok" } else { "error" };
    let warns = summary.drift_count() + summary.failure_count();

    conn.execute(
        "INSERT INTO ops_log (ts_utc, component, status, rows, warns, extra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            COMPONENT,
            status,
            summary.applied_total() as i64,
            warns as i64,
            serde_json::to_string(&extra)?,
        ],
    )
    .context("inserting ops_log row")?;

    Ok(Some(conn.last_insert_rowid()))
}
