//! Idempotent schema reconciliation for the pipeline's SQLite stores.
//!
//! Migration scripts used to each read `PRAGMA table_info`, diff it against
//! a hand-written column list and issue `ALTER TABLE ADD COLUMN` for what was
//! missing. This crate does that once:
//!
//! - [`describe_relation`] reads the live columns and indexes of a relation
//! - [`plan`] diffs a declared [`RelationSchema`] and its [`IndexSpec`]s
//!   against them, producing additive actions only
//! - [`apply`] runs a plan inside one transaction, all or nothing
//! - [`ensure`] does all three, creating the relation if it is missing
//!
//! ```no_run
//! use opskit_core::{catalog, ensure_manifest, Outcome};
//! use rusqlite::Connection;
//!
//! let mut conn = Connection::open("data/pipeline.db")?;
//! let report = ensure_manifest(&mut conn, &catalog::ops_log())?;
//! match report.outcome {
//!     Outcome::AlreadySatisfied => println!("ops_log already up to date"),
//!     other => println!("ops_log: {} change(s)", other.applied().total()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod apply;
pub mod catalog;
mod error;
pub mod introspect;
pub mod plan;
pub mod reconciler;
pub mod schema;
pub mod sql;

pub use apply::{apply, AppliedCount};
pub use error::ReconcileError;
pub use introspect::{
    describe_relation, index_owners, relation_exists, IndexOwner, ObservedColumn, ObservedIndex,
    ObservedKey, ObservedSchema,
};
pub use plan::{plan, plan_creation, plan_creation_among, Action, Drift, ReconciliationPlan};
pub use reconciler::{ensure, ensure_manifest, ensure_with, EnsurePolicy, EnsureReport, Outcome, Phase};
pub use schema::{
    ColumnDef, ColumnSpec, ColumnType, DefaultValue, Ident, IndexDef, IndexKey, IndexSpec,
    RelationManifest, RelationSchema,
};

/// Result type for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
