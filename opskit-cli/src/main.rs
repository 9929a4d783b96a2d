//! opskit-migrate: bring the pipeline's SQLite relations up to their
//! declared shape.
//!
//! ```bash
//! # Reconcile every catalog relation
//! opskit-migrate --db data/pipeline.db
//!
//! # Show what would change for one relation
//! opskit-migrate --db data/pipeline.db --relation ops_log --dry-run
//!
//! # Machine-readable report, journaled into ops_log
//! OPSKIT_DB=data/pipeline.db opskit-migrate --json --record
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use opskit_cli::{logging, migrate, record, MigrateConfig, RunOptions};
use opskit_core::EnsurePolicy;
use rusqlite::Connection;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "opskit-migrate",
    version,
    about = "Additively reconcile SQLite relations with their declared schema"
)]
struct Args {
    /// SQLite database file
    #[arg(long, value_name = "PATH", env = "OPSKIT_DB")]
    db: Option<PathBuf>,

    /// Configuration file (default: <config dir>/opskit/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Relation to reconcile; repeat for several (default: all)
    #[arg(long = "relation", value_name = "NAME")]
    relations: Vec<String>,

    /// Describe and plan only, change nothing
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Append a summary row to ops_log
    #[arg(long)]
    record: bool,

    /// Fail on missing relations instead of creating them (ops_log
    /// included: --record is then skipped if ops_log is missing)
    #[arg(long)]
    no_create: bool,

    /// Debug logging for opskit crates
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_tracing(args.verbose);
    logging::install_panic_hook();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every relation reconciled cleanly.
fn run(args: Args) -> Result<bool> {
    let mut config = MigrateConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.db_path = Some(db);
    }
    if args.no_create {
        config.create_missing = false;
    }
    if args.record {
        config.record = true;
    }

    let db_path = config
        .db_path
        .clone()
        .context("no database given: pass --db, set OPSKIT_DB, or set db_path in the config file")?;
    let manifests = config.select(&args.relations)?;

    let mut conn = Connection::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    info!(db = %db_path.display(), relations = manifests.len(), dry_run = args.dry_run, "starting");

    let policy = EnsurePolicy {
        create_missing: config.create_missing,
    };
    let opts = RunOptions {
        dry_run: args.dry_run,
        policy,
    };
    let summary = migrate::run(&mut conn, &manifests, opts);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.render_text());
    }

    if config.record {
        if args.dry_run {
            warn!("--record ignored on a dry run");
        } else if let Some(id) =
            record::record_run(&mut conn, &summary, chrono::Utc::now(), policy)?
        {
            info!(ops_log_id = id, "run recorded");
        }
    }

    Ok(summary.is_success())
}
