use thiserror::Error;

use crate::plan::ReconciliationPlan;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("relation `{0}` does not exist")]
    RelationNotFound(String),

    /// An action failed while applying a plan. The transaction was rolled
    /// back, so none of the plan's actions took effect.
    #[error(
        "reconciliation of `{relation}` conflicted {}: {source}",
        conflict_step(.failed_at, .plan)
    )]
    ReconciliationConflict {
        relation: String,
        plan: Box<ReconciliationPlan>,
        /// Index of the failing action, `None` if the commit itself failed.
        failed_at: Option<usize>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("column `{relation}.{column}` declares unsupported type `{tag}` (expected TEXT, INTEGER, REAL or BLOB)")]
    UnsupportedColumnType {
        relation: String,
        column: String,
        tag: String,
    },

    #[error("invalid {kind} `{value}`")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("relation `{0}` declares no columns")]
    EmptyRelation(String),

    #[error("column `{column}` is declared twice in relation `{relation}`")]
    DuplicateColumn { relation: String, column: String },

    #[error("index `{index}` is declared twice for relation `{relation}`")]
    DuplicateIndex { relation: String, index: String },

    #[error("index `{index}` references unknown column `{column}` of relation `{relation}`")]
    UnknownIndexColumn {
        relation: String,
        index: String,
        column: String,
    },

    #[error("column `{relation}.{column}` has an invalid default `{value}`: {reason}")]
    InvalidDefault {
        relation: String,
        column: String,
        value: String,
        reason: &'static str,
    },

    #[error("invalid constraint on `{relation}`: {reason}")]
    InvalidConstraint { relation: String, reason: String },

    /// The column is missing from the live relation but SQLite cannot add it
    /// with `ALTER TABLE ADD COLUMN` as declared.
    #[error("column `{relation}.{column}` cannot be added to an existing relation: {reason}")]
    UnaddableColumn {
        relation: String,
        column: String,
        reason: &'static str,
    },

    #[error("declared relation `{declared}` was planned against observed relation `{observed}`")]
    RelationMismatch { declared: String, observed: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

fn conflict_step(failed_at: &Option<usize>, plan: &ReconciliationPlan) -> String {
    match failed_at {
        Some(i) => match plan.actions().get(*i) {
            Some(action) => format!("at action {} of {} ({action})", i + 1, plan.len()),
            None => format!("at action {}", i + 1),
        },
        None => "at commit".to_string(),
    }
}

impl ReconcileError {
    /// Errors a caller can recover from by creating the relation or
    /// re-describing it and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReconcileError::RelationNotFound(_) | ReconcileError::ReconciliationConflict { .. }
        )
    }
}
