//! `ensure`: describe, plan and apply in one call.

use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::apply::{apply, AppliedCount};
use crate::error::ReconcileError;
use crate::introspect::{describe_relation, index_owners};
use crate::plan::{plan, plan_creation_among, Drift};
use crate::schema::{IndexSpec, RelationManifest, RelationSchema};
use crate::Result;

/// Transient phases of one `ensure` call, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inspecting,
    Planning,
    Applying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Inspecting => "inspecting",
            Phase::Planning => "planning",
            Phase::Applying => "applying",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsurePolicy {
    /// Create the relation when it does not exist. When false, a missing
    /// relation fails with [`ReconcileError::RelationNotFound`].
    pub create_missing: bool,
}

impl Default for EnsurePolicy {
    fn default() -> Self {
        Self {
            create_missing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "applied", rename_all = "snake_case")]
pub enum Outcome {
    /// The live relation already matched; nothing was executed.
    AlreadySatisfied,
    /// Columns and/or indexes were added to an existing relation.
    Migrated(AppliedCount),
    /// The relation did not exist and was created in full.
    Created(AppliedCount),
}

impl Outcome {
    pub fn applied(&self) -> AppliedCount {
        match self {
            Outcome::AlreadySatisfied => AppliedCount::default(),
            Outcome::Migrated(count) | Outcome::Created(count) => *count,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Outcome::AlreadySatisfied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    pub relation: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub drift: Vec<Drift>,
}

impl EnsureReport {
    pub fn applied(&self) -> AppliedCount {
        self.outcome.applied()
    }
}

/// Bring relation `desired` and its `indexes` in line with the declaration,
/// creating the relation if it is missing.
pub fn ensure(
    conn: &mut Connection,
    desired: &RelationSchema,
    indexes: &[IndexSpec],
) -> Result<EnsureReport> {
    ensure_with(conn, desired, indexes, EnsurePolicy::default())
}

pub fn ensure_manifest(conn: &mut Connection, manifest: &RelationManifest) -> Result<EnsureReport> {
    ensure(conn, &manifest.schema, &manifest.indexes)
}

pub fn ensure_with(
    conn: &mut Connection,
    desired: &RelationSchema,
    indexes: &[IndexSpec],
    policy: EnsurePolicy,
) -> Result<EnsureReport> {
    let span = info_span!("ensure", relation = %desired.name);
    let _guard = span.enter();

    debug!(phase = %Phase::Inspecting);
    let (plan, creating) = match describe_relation(conn, &desired.name) {
        Ok(observed) => {
            debug!(phase = %Phase::Planning, live_columns = observed.columns.len());
            (plan(desired, indexes, &observed)?, false)
        }
        Err(ReconcileError::RelationNotFound(_)) if policy.create_missing => {
            debug!(phase = %Phase::Planning, "relation missing, planning creation");
            (plan_creation_among(desired, indexes, &index_owners(conn)?)?, true)
        }
        Err(e) => return Err(e),
    };

    for drift in plan.drift() {
        warn!(%drift, "schema drift left untouched");
    }

    if plan.is_empty() {
        info!("already satisfied");
        return Ok(EnsureReport {
            relation: desired.name.clone(),
            outcome: Outcome::AlreadySatisfied,
            drift: plan.drift().to_vec(),
        });
    }

    debug!(phase = %Phase::Applying, actions = plan.len());
    let applied = apply(conn, &plan)?;

    let outcome = if creating {
        info!(indexes = applied.indexes_created, "relation created");
        Outcome::Created(applied)
    } else {
        info!(
            columns = applied.columns_added,
            indexes = applied.indexes_created,
            "relation migrated"
        );
        Outcome::Migrated(applied)
    };

    Ok(EnsureReport {
        relation: desired.name.clone(),
        outcome,
        drift: plan.drift().to_vec(),
    })
}
