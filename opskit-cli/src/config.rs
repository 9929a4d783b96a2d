//! Configuration for `opskit-migrate`.
//!
//! Loaded from TOML. Relations beyond the built-in catalog are declared as
//! `[[relations]]` tables:
//!
//! ```toml
//! db_path = "data/pipeline.db"
//!
//! [[relations]]
//! name = "fills_daily"
//! columns = [
//!     { name = "id", type = "INTEGER", primary_key = true },
//!     { name = "symbol", type = "TEXT", nullable = false, default = { literal = "''" } },
//! ]
//! indexes = [{ name = "idx_fills_daily_symbol", keys = ["symbol"] }]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use opskit_core::{catalog, RelationManifest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// SQLite database to reconcile.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// How long SQLite waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Create relations that do not exist yet.
    #[serde(default = "default_create_missing")]
    pub create_missing: bool,

    /// Append a summary row to `ops_log` after each run.
    #[serde(default)]
    pub record: bool,

    /// Relations managed in addition to the built-in catalog.
    #[serde(default)]
    pub relations: Vec<RelationManifest>,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_create_missing() -> bool {
    true
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            create_missing: default_create_missing(),
            record: false,
            relations: Vec::new(),
        }
    }
}

impl MigrateConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.check_relation_names()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `<config dir>/opskit/config.toml` for the current user, if the
    /// platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "opskit").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `explicit` if given (it must exist), else from the default
    /// location if a file is there, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// The catalog relations followed by the configured ones.
    pub fn manifests(&self) -> Vec<RelationManifest> {
        let mut all = catalog::all();
        all.extend(self.relations.iter().cloned());
        all
    }

    /// The manifests named in `names`, in that order, or every manifest if
    /// `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<RelationManifest>> {
        let all = self.manifests();
        if names.is_empty() {
            return Ok(all);
        }

        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            match all.iter().find(|m| m.name().eq_ignore_ascii_case(name)) {
                Some(manifest) => selected.push(manifest.clone()),
                None => {
                    let known: Vec<&str> = all.iter().map(|m| m.name()).collect();
                    bail!("unknown relation `{}` (known: {})", name, known.join(", "));
                }
            }
        }
        Ok(selected)
    }

    /// Each relation has exactly one declaration, so configured relations
    /// may not redeclare a catalog relation or each other.
    fn check_relation_names(&self) -> Result<()> {
        for (i, manifest) in self.relations.iter().enumerate() {
            let name = manifest.name();
            if catalog::find(name).is_some() {
                bail!("relation `{}` is built in and cannot be redeclared in config", name);
            }
            if self.relations[..i]
                .iter()
                .any(|other| other.name().eq_ignore_ascii_case(name))
            {
                bail!("relation `{}` is declared more than once", name);
            }
        }
        Ok(())
    }
}
