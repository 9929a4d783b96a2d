//! Library side of `opskit-migrate`: configuration, the per-relation run
//! loop, reporting and the `ops_log` journal entry.

pub mod config;
pub mod logging;
pub mod migrate;
pub mod record;
pub mod report;

pub use config::MigrateConfig;
pub use migrate::{run, RunOptions};
pub use report::{RelationResult, RunSummary};
