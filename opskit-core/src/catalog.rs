// opskit-core/src/catalog.rs

//! The canonical declarations of the pipeline relations this toolkit owns.
//!
//! Each relation is declared here once. Scripts that need `ops_log` call
//! [`ops_log`] rather than re-typing its columns.

use crate::schema::{ColumnSpec, IndexSpec, RelationManifest, RelationSchema};

/// Default for `ts_utc` columns on newly created relations (ISO-8601, UTC).
pub const UTC_NOW_EXPR: &str = "strftime('%Y-%m-%dT%H:%M:%SZ','now')";

/// Operations journal: one row per script run.
pub fn ops_log() -> RelationManifest {
    RelationManifest::new(
        RelationSchema::new("ops_log")
            .column(ColumnSpec::integer("id").primary_key().autoincrement())
            .column(ColumnSpec::text("ts_utc").not_null().default_expr(UTC_NOW_EXPR))
            .column(ColumnSpec::text("component"))
            .column(ColumnSpec::text("status").not_null().default_literal("'ok'"))
            .column(ColumnSpec::integer("rows").default_literal("0"))
            .column(ColumnSpec::integer("warns").default_literal("0"))
            .column(ColumnSpec::text("extra")),
        vec![IndexSpec::new("idx_ops_log_ts", ["ts_utc"])],
    )
}

/// Alerts sent to operators, de-duplicated per day, driver and reason.
pub fn alert_log() -> RelationManifest {
    RelationManifest::new(
        RelationSchema::new("alert_log")
            .column(ColumnSpec::integer("id").primary_key().autoincrement())
            .column(ColumnSpec::text("ts").not_null().default_expr(UTC_NOW_EXPR))
            .column(ColumnSpec::text("driver").not_null())
            .column(ColumnSpec::text("reason").not_null())
            .column(ColumnSpec::text("message"))
            .column(ColumnSpec::integer("delivered").not_null().default_literal("0")),
        vec![IndexSpec::unique(
            "ux_alert_log_day_driver_reason",
            ["date(ts)", "driver", "reason"],
        )],
    )
}

/// Health and latency probe results.
pub fn latency_probe() -> RelationManifest {
    RelationManifest::new(
        RelationSchema::new("latency_probe")
            .column(ColumnSpec::integer("id").primary_key().autoincrement())
            .column(ColumnSpec::text("ts_utc").not_null().default_expr(UTC_NOW_EXPR))
            .column(ColumnSpec::text("target").not_null())
            .column(ColumnSpec::real("latency_ms"))
            .column(ColumnSpec::integer("ok").not_null().default_literal("1"))
            .column(ColumnSpec::text("detail")),
        vec![IndexSpec::new(
            "idx_latency_probe_target_ts",
            ["target", "ts_utc DESC"],
        )],
    )
}

/// Every catalog relation, in the order they should be ensured.
pub fn all() -> Vec<RelationManifest> {
    vec![ops_log(), alert_log(), latency_probe()]
}

pub fn find(name: &str) -> Option<RelationManifest> {
    all()
        .into_iter()
        .find(|m| m.name().eq_ignore_ascii_case(name))
}
