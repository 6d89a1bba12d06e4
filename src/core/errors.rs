//! PS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PsError>;

/// Top-level error type for the prediction service.
#[derive(Debug, Error)]
pub enum PsError {
    #[error("[PS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PS-1201] cannot read model artifact {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PS-1202] malformed model artifact {path}: {details}")]
    ArtifactParse { path: PathBuf, details: String },

    #[error("[PS-1203] model artifacts disagree: {details}")]
    SchemaMismatch { details: String },

    #[error("[PS-1204] invalid scoring pipeline: {details}")]
    InvalidPipeline { details: String },

    #[error("[PS-2001] Observation ID: \"{observation_id}\" already exists")]
    DuplicateObservation { observation_id: i64 },

    #[error("[PS-2002] Observation ID: \"{observation_id}\" does not exist")]
    ObservationNotFound { observation_id: i64 },

    #[error("[PS-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PS-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[PS-2103] invalid database URL: {details}")]
    InvalidDatabaseUrl { details: String },

    #[error("[PS-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PS-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PsError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PS-1001",
            Self::MissingConfig { .. } => "PS-1002",
            Self::ConfigParse { .. } => "PS-1003",
            Self::ArtifactIo { .. } => "PS-1201",
            Self::ArtifactParse { .. } => "PS-1202",
            Self::SchemaMismatch { .. } => "PS-1203",
            Self::InvalidPipeline { .. } => "PS-1204",
            Self::DuplicateObservation { .. } => "PS-2001",
            Self::ObservationNotFound { .. } => "PS-2002",
            Self::Serialization { .. } => "PS-2101",
            Self::Sql { .. } => "PS-2102",
            Self::InvalidDatabaseUrl { .. } => "PS-2103",
            Self::Io { .. } => "PS-3002",
            Self::Runtime { .. } => "PS-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Sql { .. } | Self::Runtime { .. }
        )
    }

    /// Whether the error prevents the process from serving traffic.
    #[must_use]
    pub const fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::ArtifactIo { .. }
                | Self::ArtifactParse { .. }
                | Self::SchemaMismatch { .. }
                | Self::InvalidPipeline { .. }
        )
    }

    /// Message without the `[PS-xxxx]` prefix, as returned to HTTP callers.
    #[must_use]
    pub fn client_message(&self) -> String {
        let rendered = self.to_string();
        match rendered.split_once("] ") {
            Some((prefix, rest)) if prefix.starts_with("[PS-") => rest.to_string(),
            _ => rendered,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for PsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for PsError {
    fn from(value: postgres::Error) -> Self {
        Self::Sql {
            context: "postgres",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for PsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PsError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
