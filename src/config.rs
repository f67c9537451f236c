use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::app::ports::Store;
use crate::constants::*;
use crate::error::{IngestError, Result};
use crate::infra::memory_store::InMemoryStore;
use crate::infra::sqlite_store::SqliteStore;
use crate::pipeline::dedup::DetailConflictPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(IngestError::Config(format!("unknown store backend '{other}'"))),
        }
    }
}

/// Service configuration. Precedence, lowest first: defaults, `config.toml`,
/// environment (`.env` included), command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub listen_port: u16,
    pub busy_timeout_ms: u64,
    pub detail_conflict_policy: DetailConflictPolicy,
    pub log_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub store: StoreBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            listen_port: DEFAULT_LISTEN_PORT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            detail_conflict_policy: DetailConflictPolicy::default(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            metrics_port: None,
            store: StoreBackend::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `$TURO_INGEST_CONFIG` / `config.toml` when
    /// they exist, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(explicit) => Self::from_file(&explicit)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `TURO_INGEST_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LISTEN_PORT) {
            self.listen_port = parse_number(ENV_LISTEN_PORT, &v)?;
        }
        if let Some(v) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = parse_number(ENV_BUSY_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_DETAIL_CONFLICT_POLICY) {
            self.detail_conflict_policy = v.parse()?;
        }
        if let Some(v) = lookup(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_METRICS_PORT) {
            self.metrics_port = Some(parse_number(ENV_METRICS_PORT, &v)?);
        }
        if let Some(v) = lookup(ENV_STORE) {
            self.store = v.parse()?;
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn build_store(&self) -> Result<Arc<dyn Store>> {
        match self.store {
            StoreBackend::Sqlite => {
                let store = SqliteStore::open(&self.database_path, self.busy_timeout())?;
                info!("Using SQLite store at {}", store.path().display());
                Ok(Arc::new(store))
            }
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Ok(Arc::new(InMemoryStore::new()))
            }
        }
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| IngestError::Config(format!("{key} must be a number, got '{raw}'")))
}
