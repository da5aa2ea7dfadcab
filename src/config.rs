// src/config.rs
//! Typed scraper settings loaded from a JSON file.
//!
//! Every key is optional; defaults are filled in when the file is read so
//! the rest of the crate only ever sees concrete values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::utils::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// Overrides the exchange's own listing method when set
    pub method: Option<HttpMethod>,
    /// Overrides the exchange's base URL when set
    pub endpoint: Option<String>,
    /// Default request parameters; per-request values win on conflict
    pub params: BTreeMap<String, String>,
    pub max_retries: u32,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub db_path: Option<PathBuf>,
    pub credentials: BTreeMap<String, String>,
    /// URL prefix that connection-level retries apply to
    pub schema: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            method: None,
            endpoint: None,
            params: BTreeMap::new(),
            max_retries: 3,
            timeout: 10,
            db_path: None,
            credentials: BTreeMap::new(),
            schema: "https://".to_string(),
        }
    }
}

impl ScraperConfig {
    /// Reads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: ScraperConfig = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        if config.timeout == 0 {
            return Err(AppError::Config("timeout must be at least 1 second".to_string()));
        }
        tracing::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Picks the database path: explicit override, then config, then the exchange default.
    pub fn resolve_db_path(&self, cli_override: Option<&Path>, exchange_default: &str) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(exchange_default))
    }
}
