//! Runtime configuration for the ledgerday binary
//!
//! Defaults live under `~/.ledgerday/`. An optional `config.toml` there
//! overrides them, `LEDGERDAY_*` environment variables override the file,
//! and CLI flags override everything.

use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::DEFAULT_BATCH_SIZE;
use crate::types::{DimensionNames, LedgerdayError, Result};

pub const ENV_DATA_DIR: &str = "LEDGERDAY_DATA_DIR";
pub const ENV_STORE: &str = "LEDGERDAY_STORE";
pub const ENV_NAMES: &str = "LEDGERDAY_NAMES";
pub const ENV_BATCH_SIZE: &str = "LEDGERDAY_BATCH_SIZE";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory scanned for `**/*.jsonl` transaction exports
    pub transactions_dir: PathBuf,
    /// JSON document holding materialized summaries
    pub store_path: PathBuf,
    /// Optional id -> name directory for breakdown lines
    pub names_path: Option<PathBuf>,
    pub batch_size: usize,
}

/// On-disk shape of `config.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    transactions_dir: Option<PathBuf>,
    store_path: Option<PathBuf>,
    names_path: Option<PathBuf>,
    batch_size: Option<usize>,
}

impl Config {
    /// Defaults rooted at `home`
    pub fn with_home(home: &Path) -> Self {
        let root = home.join(".ledgerday");
        Self {
            transactions_dir: root.join("transactions"),
            store_path: root.join("summaries.json"),
            names_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Defaults, then `~/.ledgerday/config.toml`, then the environment
    pub fn load() -> Result<Self> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| LedgerdayError::Config("Cannot determine home directory".into()))?;
        let home = base_dirs.home_dir();

        let mut config = Self::with_home(home);
        let path = home.join(".ledgerday").join("config.toml");
        if path.exists() {
            config.merge_file(&path)?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay the keys present in a TOML file
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        self.merge_toml(&content)
            .map_err(|e| LedgerdayError::Config(format!("{}: {}", path.display(), e)))
    }

    fn merge_toml(&mut self, content: &str) -> std::result::Result<(), String> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| e.to_string())?;
        if let Some(dir) = file.transactions_dir {
            self.transactions_dir = dir;
        }
        if let Some(path) = file.store_path {
            self.store_path = path;
        }
        if file.names_path.is_some() {
            self.names_path = file.names_path;
        }
        if let Some(size) = file.batch_size {
            self.batch_size = validate_batch_size(size).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Overlay `LEDGERDAY_*` variables as reported by `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.transactions_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_STORE) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_NAMES) {
            self.names_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            let size = raw.trim().parse::<usize>().map_err(|e| {
                LedgerdayError::Config(format!("{}='{}': {}", ENV_BATCH_SIZE, raw, e))
            })?;
            self.batch_size = validate_batch_size(size)?;
        }
        Ok(())
    }

    /// Read the names directory, or an empty one when none is configured
    pub fn load_names(&self) -> Result<DimensionNames> {
        match &self.names_path {
            Some(path) => load_names(path),
            None => Ok(DimensionNames::default()),
        }
    }
}

pub fn validate_batch_size(size: usize) -> Result<usize> {
    if size == 0 {
        return Err(LedgerdayError::Config("batch_size must be at least 1".into()));
    }
    Ok(size)
}

/// Parse a `{categories, pockets, platforms}` JSON names file
pub fn load_names(path: &Path) -> Result<DimensionNames> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| LedgerdayError::Config(format!("{}: {}", path.display(), e)))
}
