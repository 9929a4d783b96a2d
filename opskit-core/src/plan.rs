//! Reconciliation planning.
//!
//! [`plan`] compares a declared relation against its introspected
//! [`ObservedSchema`] and lists the additive actions needed to converge.
//! It is a pure function: same inputs, same actions in the same order.
//!
//! Only three kinds of action exist, none of them destructive:
//!
//! ```text
//! CreateRelation   CREATE TABLE with every declared column and constraint
//! AddColumn        ALTER TABLE .. ADD COLUMN, appended after existing columns
//! CreateIndex      CREATE [UNIQUE] INDEX
//! ```
//!
//! Mismatches the planner will not fix (a column with a different declared
//! type, an index whose name exists with different keys) are reported as
//! [`Drift`] and left alone. Dropping, renaming or retyping is a separate,
//! reviewed migration.

use std::fmt;

use serde::Serialize;

use crate::error::ReconcileError;
use crate::introspect::{normalize_key, IndexOwner, ObservedIndex, ObservedSchema};
use crate::schema::{
    validate_indexes, validate_relation, ColumnDef, IndexDef, IndexKey, IndexSpec, Ident,
    RelationSchema, SortOrder,
};
use crate::sql;
use crate::Result;

/// A single additive schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    CreateRelation { columns: Vec<ColumnDef> },
    AddColumn { column: ColumnDef },
    CreateIndex { index: IndexDef },
}

impl Action {
    /// Generate the SQL statement for this action against `relation`.
    pub fn to_sql(&self, relation: &Ident) -> String {
        match self {
            Action::CreateRelation { columns } => sql::create_table_sql(relation, columns),
            Action::AddColumn { column } => sql::add_column_sql(relation, column),
            Action::CreateIndex { index } => sql::create_index_sql(relation, index),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateRelation { columns } => {
                write!(f, "create relation with {} columns", columns.len())
            }
            Action::AddColumn { column } => write!(f, "add column `{}` {}", column.name, column.ty),
            Action::CreateIndex { index } => {
                let kind = if index.unique { "unique index" } else { "index" };
                write!(f, "create {} `{}`", kind, index.name)
            }
        }
    }
}

/// A declared-vs-live difference the planner deliberately does not act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "drift", rename_all = "snake_case")]
pub enum Drift {
    ColumnType {
        column: String,
        declared: String,
        observed: String,
    },
    IndexDefinition {
        index: String,
        declared: String,
        observed: String,
    },
    /// The declared index name is already taken by an index on another
    /// relation.
    IndexNameTaken { index: String, relation: String },
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::ColumnType {
                column,
                declared,
                observed,
            } => write!(
                f,
                "column `{}` is declared {} but the live type is `{}`",
                column, declared, observed
            ),
            Drift::IndexDefinition {
                index,
                declared,
                observed,
            } => write!(
                f,
                "index `{}` exists with a different definition (declared: {}; live: {})",
                index, declared, observed
            ),
            Drift::IndexNameTaken { index, relation } => write!(
                f,
                "index `{}` cannot be created: the name is already used by an index on `{}`",
                index, relation
            ),
        }
    }
}

/// Ordered additive actions for one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    relation: Ident,
    actions: Vec<Action>,
    drift: Vec<Drift>,
}

impl ReconciliationPlan {
    pub fn relation(&self) -> &Ident {
        &self.relation
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn drift(&self) -> &[Drift] {
        &self.drift
    }

    /// Returns true if there is nothing to apply. Drift does not count.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn creates_relation(&self) -> bool {
        matches!(self.actions.first(), Some(Action::CreateRelation { .. }))
    }

    /// Rendered statements, one per action, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.actions
            .iter()
            .map(|a| a.to_sql(&self.relation))
            .collect()
    }

    /// Generate SQL for the whole plan, like a migration file would hold it.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("-- Relation: {}\n", self.relation);
        for statement in self.statements() {
            sql.push_str(&statement);
            sql.push('\n');
        }
        sql
    }
}

/// Diff `desired`/`indexes` against `observed`.
///
/// Every declaration is validated before any action is produced. Columns
/// absent from `observed` (by name, case-insensitively) become
/// [`Action::AddColumn`] in declaration order, then indexes absent by name
/// become [`Action::CreateIndex`] in declaration order.
pub fn plan(
    desired: &RelationSchema,
    indexes: &[IndexSpec],
    observed: &ObservedSchema,
) -> Result<ReconciliationPlan> {
    let relation = validate_relation(desired)?;
    if !relation.name.matches(&observed.name) {
        return Err(ReconcileError::RelationMismatch {
            declared: desired.name.clone(),
            observed: observed.name.clone(),
        });
    }

    let index_defs = validate_indexes(&relation.name, indexes, |column| {
        relation.column(column).is_some() || observed.has_column(column)
    })?;

    let mut actions = Vec::new();
    let mut drift = Vec::new();

    for col in &relation.columns {
        match observed.column(col.name.as_str()) {
            Some(live) => {
                if !live.declared_type.eq_ignore_ascii_case(col.ty.as_sql()) {
                    drift.push(Drift::ColumnType {
                        column: col.name.to_string(),
                        declared: col.ty.to_string(),
                        observed: live.declared_type.clone(),
                    });
                }
            }
            None => {
                if let Some(reason) = col.unaddable_reason() {
                    return Err(ReconcileError::UnaddableColumn {
                        relation: desired.name.clone(),
                        column: col.name.to_string(),
                        reason,
                    });
                }
                actions.push(Action::AddColumn {
                    column: col.clone(),
                });
            }
        }
    }

    for idx in index_defs {
        match observed.index(idx.name.as_str()) {
            Some(live) => {
                if !index_matches(&idx, live) {
                    drift.push(Drift::IndexDefinition {
                        index: idx.name.to_string(),
                        declared: sql::create_index_sql(&relation.name, &idx),
                        observed: describe_live_index(live),
                    });
                }
            }
            None => match observed.foreign_index(idx.name.as_str()) {
                Some(owner) => drift.push(name_taken(&idx, owner)),
                None => actions.push(Action::CreateIndex { index: idx }),
            },
        }
    }

    Ok(ReconciliationPlan {
        relation: relation.name,
        actions,
        drift,
    })
}

/// Plan for a relation that does not exist yet: one
/// [`Action::CreateRelation`] carrying every column and constraint, then
/// every declared index.
pub fn plan_creation(desired: &RelationSchema, indexes: &[IndexSpec]) -> Result<ReconciliationPlan> {
    plan_creation_among(desired, indexes, &[])
}

/// [`plan_creation`] in a database whose existing indexes are `existing`
/// (see [`crate::introspect::index_owners`]). Declared indexes whose name
/// is already taken are reported as [`Drift::IndexNameTaken`] instead of
/// being created.
pub fn plan_creation_among(
    desired: &RelationSchema,
    indexes: &[IndexSpec],
    existing: &[IndexOwner],
) -> Result<ReconciliationPlan> {
    let relation = validate_relation(desired)?;
    let index_defs = validate_indexes(&relation.name, indexes, |column| {
        relation.column(column).is_some()
    })?;

    let mut actions = Vec::with_capacity(1 + index_defs.len());
    let mut drift = Vec::new();
    actions.push(Action::CreateRelation {
        columns: relation.columns.clone(),
    });
    for idx in index_defs {
        match existing.iter().find(|o| idx.name.matches(&o.name)) {
            Some(owner) => drift.push(name_taken(&idx, owner)),
            None => actions.push(Action::CreateIndex { index: idx }),
        }
    }

    Ok(ReconciliationPlan {
        relation: relation.name,
        actions,
        drift,
    })
}

fn name_taken(idx: &IndexDef, owner: &IndexOwner) -> Drift {
    Drift::IndexNameTaken {
        index: idx.name.to_string(),
        relation: owner.relation.clone(),
    }
}

/// Compare what SQLite reports for an index with its declaration, key by
/// key: plain columns by name and sort order, expression keys by their
/// normalized text as read back from the stored `CREATE INDEX`.
fn index_matches(declared: &IndexDef, live: &ObservedIndex) -> bool {
    if declared.unique != live.unique || declared.keys.len() != live.keys.len() {
        return false;
    }

    declared.keys.iter().zip(&live.keys).all(|(key, live_key)| {
        match (key, &live_key.column) {
            (IndexKey::Column { name, order }, Some(live_name)) => {
                name.matches(live_name) && (*order == SortOrder::Desc) == live_key.descending
            }
            (IndexKey::Function { .. }, None) => {
                !live_key.descending
                    && live_key.expression.as_deref()
                        == Some(normalize_key(&sql::index_key_sql(key)).as_str())
            }
            _ => false,
        }
    })
}

fn describe_live_index(live: &ObservedIndex) -> String {
    if let Some(sql) = &live.sql {
        return sql.clone();
    }
    let keys: Vec<String> = live
        .keys
        .iter()
        .map(|k| {
            let name = k.column.as_deref().unwrap_or("<expr>");
            if k.descending {
                format!("{} DESC", name)
            } else {
                name.to_string()
            }
        })
        .collect();
    format!(
        "{}({})",
        if live.unique { "unique " } else { "" },
        keys.join(", ")
    )
}
