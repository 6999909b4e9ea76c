use crate::error::{Result, RetrievalError};
use docrag_chunker::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "DOCRAG_CONFIG";
pub const STORE_PATH_ENV: &str = "DOCRAG_STORE_PATH";
pub const DOCUMENTS_DIR_ENV: &str = "DOCRAG_DOCUMENTS_DIR";
pub const CHUNK_SIZE_ENV: &str = "DOCRAG_CHUNK_SIZE";
pub const OVERLAP_ENV: &str = "DOCRAG_OVERLAP";

pub const DEFAULT_STORE_PATH: &str = "data/vectors/store.drvs";
pub const DEFAULT_DOCUMENTS_DIR: &str = "data/raw";

/// Where the service keeps its store, where it looks for documents, and how it chunks them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    pub store_path: PathBuf,
    pub documents_dir: PathBuf,
    pub chunker: ChunkerConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            documents_dir: PathBuf::from(DEFAULT_DOCUMENTS_DIR),
            chunker: ChunkerConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Defaults, then the TOML file (if any), then the process environment.
    ///
    /// `file` takes precedence over `DOCRAG_CONFIG`. The result is not validated
    /// so callers can still layer their own overrides on top.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let env_file = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match file.map(Path::to_path_buf).or(env_file) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    /// Overlay values from an environment lookup; unset keys leave fields untouched
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(STORE_PATH_ENV) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(DOCUMENTS_DIR_ENV) {
            self.documents_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(CHUNK_SIZE_ENV) {
            self.chunker.chunk_size = parse_count(CHUNK_SIZE_ENV, &raw)?;
        }
        if let Some(raw) = lookup(OVERLAP_ENV) {
            self.chunker.overlap = parse_count(OVERLAP_ENV, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker.validate()?;
        if self.store_path.as_os_str().is_empty() {
            return Err(RetrievalError::Config("store_path must not be empty".into()));
        }
        if self.documents_dir.as_os_str().is_empty() {
            return Err(RetrievalError::Config(
                "documents_dir must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| {
        RetrievalError::Config(format!("{key} must be a non-negative integer, got {raw:?}"))
    })
}
