//! Reconcile a list of relations, one at a time.

use opskit_core::{
    describe_relation, ensure_with, index_owners, plan, plan_creation_among, EnsurePolicy,
    ReconcileError, ReconciliationPlan, RelationManifest,
};
use rusqlite::Connection;
use tracing::{error, info};

use crate::report::{RelationResult, RunSummary};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Describe and plan only; never execute anything.
    pub dry_run: bool,
    pub policy: EnsurePolicy,
}

/// Reconcile every manifest in order.
///
/// A relation that fails is recorded as [`RelationResult::Failed`] and the
/// run moves on to the next one.
pub fn run(conn: &mut Connection, manifests: &[RelationManifest], opts: RunOptions) -> RunSummary {
    let mut summary = RunSummary::new(opts.dry_run);

    for manifest in manifests {
        let name = manifest.name();
        let result = if opts.dry_run {
            dry_run(conn, manifest, opts.policy).map(|plan| RelationResult::planned(name, &plan))
        } else {
            ensure_with(conn, &manifest.schema, &manifest.indexes, opts.policy)
                .map(RelationResult::Ensured)
        };

        let result = result.unwrap_or_else(|e| {
            error!(relation = name, error = %e, recoverable = e.is_recoverable(), "reconcile failed");
            RelationResult::failed(name, &e)
        });
        summary.push(result);
    }

    info!(
        relations = summary.results.len(),
        applied = summary.applied_total(),
        drift = summary.drift_count(),
        failures = summary.failure_count(),
        "run finished"
    );
    summary
}

/// The plan `ensure_with` would execute for `manifest`.
pub fn dry_run(
    conn: &Connection,
    manifest: &RelationManifest,
    policy: EnsurePolicy,
) -> opskit_core::Result<ReconciliationPlan> {
    match describe_relation(conn, manifest.name()) {
        Ok(observed) => plan(&manifest.schema, &manifest.indexes, &observed),
        Err(ReconcileError::RelationNotFound(_)) if policy.create_missing => {
            plan_creation_among(&manifest.schema, &manifest.indexes, &index_owners(conn)?)
        }
        Err(e) => Err(e),
    }
}
