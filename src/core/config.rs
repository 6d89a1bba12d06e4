//! Service configuration: TOML file with environment overrides, resolved once at startup.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{PsError, Result};
use crate::store::backend::BackendDescriptor;

/// Config file consulted when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "predsvc.toml";

/// Environment variable whose presence switches the store to PostgreSQL.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// What `/predict` does when an observation id has already been recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Strict insert: the second prediction is refused and the row is left untouched.
    #[default]
    Reject,
    /// Upsert: the stored observation and probability are replaced.
    Overwrite,
}

impl DuplicatePolicy {
    /// Parse the textual form used in TOML and `PREDSVC_DUPLICATE_POLICY`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" | "strict" => Ok(Self::Reject),
            "overwrite" | "upsert" => Ok(Self::Overwrite),
            other => Err(PsError::InvalidConfig {
                details: format!("unknown duplicate policy {other:?} (expected reject|overwrite)"),
            }),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub json_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: std::thread::available_parallelism().map_or(2, std::num::NonZero::get),
            json_limit_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Location of the three model artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub columns_file: String,
    pub dtypes_file: String,
    pub pipeline_file: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
            columns_file: "columns.json".to_string(),
            dtypes_file: "dtypes.json".to_string(),
            pipeline_file: "pipeline.json".to_string(),
        }
    }
}

impl ArtifactConfig {
    #[must_use]
    pub fn columns_path(&self) -> PathBuf {
        self.dir.join(&self.columns_file)
    }

    #[must_use]
    pub fn dtypes_path(&self) -> PathBuf {
        self.dir.join(&self.dtypes_file)
    }

    #[must_use]
    pub fn pipeline_path(&self) -> PathBuf {
        self.dir.join(&self.pipeline_file)
    }
}

/// Prediction record store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file used when no `DATABASE_URL` is set.
    pub sqlite_path: PathBuf,
    /// Networked backend connection string. Normally supplied via `DATABASE_URL`.
    pub database_url: Option<String>,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("predictions.db"),
            database_url: None,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub artifacts: ArtifactConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from `path` (or `predsvc.toml` when `None`) and the
    /// process environment.
    ///
    /// An explicitly requested file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(PsError::MissingConfig {
                        path: explicit.to_path_buf(),
                    });
                }
                Self::from_file(explicit)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| PsError::io(path, source))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup(DATABASE_URL_ENV) {
            self.store.database_url = Some(url);
        }
        if let Some(host) = lookup("PREDSVC_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PREDSVC_PORT") {
            self.server.port = parse_env_number("PREDSVC_PORT", &port)?;
        }
        if let Some(workers) = lookup("PREDSVC_WORKERS") {
            self.server.workers = parse_env_number("PREDSVC_WORKERS", &workers)?;
        }
        if let Some(dir) = lookup("PREDSVC_ARTIFACT_DIR") {
            self.artifacts.dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("PREDSVC_SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(path);
        }
        if let Some(policy) = lookup("PREDSVC_DUPLICATE_POLICY") {
            self.store.duplicate_policy = DuplicatePolicy::parse(&policy)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PsError::InvalidConfig {
                details: "server.port must be non-zero".to_string(),
            });
        }
        if self.server.workers == 0 {
            return Err(PsError::InvalidConfig {
                details: "server.workers must be at least 1".to_string(),
            });
        }
        for (key, name) in [
            ("artifacts.columns_file", &self.artifacts.columns_file),
            ("artifacts.dtypes_file", &self.artifacts.dtypes_file),
            ("artifacts.pipeline_file", &self.artifacts.pipeline_file),
        ] {
            if name.trim().is_empty() {
                return Err(PsError::InvalidConfig {
                    details: format!("{key} must not be empty"),
                });
            }
        }
        Ok(())
    }

    /// Resolve the store settings into a typed backend descriptor.
    pub fn backend(&self) -> Result<BackendDescriptor> {
        BackendDescriptor::resolve(self.store.database_url.as_deref(), &self.store.sqlite_path)
    }
}

fn parse_env_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| PsError::InvalidConfig {
        details: format!("{key} must be a number, got {raw:?}"),
    })
}
