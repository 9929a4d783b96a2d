use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ReconcileError;
use crate::plan::{Action, ReconciliationPlan};
use crate::Result;

/// How many actions of each kind were executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedCount {
    pub relations_created: usize,
    pub columns_added: usize,
    pub indexes_created: usize,
}

impl AppliedCount {
    pub fn total(&self) -> usize {
        self.relations_created + self.columns_added + self.indexes_created
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    fn record(&mut self, action: &Action) {
        match action {
            Action::CreateRelation { .. } => self.relations_created += 1,
            Action::AddColumn { .. } => self.columns_added += 1,
            Action::CreateIndex { .. } => self.indexes_created += 1,
        }
    }
}

/// Execute `plan` in one all-or-nothing transaction.
///
/// The transaction is opened with `BEGIN IMMEDIATE`, so the write lock is
/// held from the first statement and readers see either none or all of the
/// plan. If any statement fails the transaction is rolled back and
/// [`ReconcileError::ReconciliationConflict`] is returned; the caller may
/// re-describe the relation and plan again.
pub fn apply(conn: &mut Connection, plan: &ReconciliationPlan) -> Result<AppliedCount> {
    let mut count = AppliedCount::default();
    if plan.is_empty() {
        return Ok(count);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for (i, action) in plan.actions().iter().enumerate() {
        let statement = action.to_sql(plan.relation());
        debug!(step = i + 1, %statement, "executing");

        if let Err(source) = tx.execute_batch(&statement) {
            if let Err(rollback) = tx.rollback() {
                warn!(error = %rollback, "rollback after failed action also failed");
            }
            return Err(conflict(plan, Some(i), source));
        }
        count.record(action);
    }

    tx.commit().map_err(|source| conflict(plan, None, source))?;
    Ok(count)
}

fn conflict(plan: &ReconciliationPlan, failed_at: Option<usize>, source: rusqlite::Error) -> ReconcileError {
    ReconcileError::ReconciliationConflict {
        relation: plan.relation().to_string(),
        plan: Box::new(plan.clone()),
        failed_at,
        source,
    }
}
