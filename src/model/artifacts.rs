//! Startup loading of the column list, dtype map, and scoring pipeline.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::coerce::{ColumnType, ObservationRow, Schema};
use super::pipeline::{Classifier, LogisticPipeline, PipelineSpec};
use crate::core::config::ArtifactConfig;
use crate::core::errors::{PsError, Result};

/// Immutable model state shared by every request for the process lifetime.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    schema: Schema,
    pipeline: LogisticPipeline,
    fingerprint: String,
}

impl ModelArtifacts {
    /// Load and cross-check all three artifacts. Any failure is fatal for startup.
    pub fn load(config: &ArtifactConfig) -> Result<Self> {
        let columns = read_artifact(&config.columns_path())?;
        let dtypes = read_artifact(&config.dtypes_path())?;
        let pipeline = read_artifact(&config.pipeline_path())?;
        let artifacts = Self::from_sources(&columns, &dtypes, &pipeline)
            .map_err(|err| attach_path(err, config))?;
        log::info!(
            "model artifacts loaded from {}: {} columns, {} encoded features, fingerprint {}",
            config.dir.display(),
            artifacts.schema.len(),
            artifacts.pipeline.encoded_width(),
            artifacts.short_fingerprint()
        );
        Ok(artifacts)
    }

    /// Build from in-memory artifact text.
    pub fn from_sources(columns: &str, dtypes: &str, pipeline: &str) -> Result<Self> {
        let column_list: Vec<String> = parse_artifact("columns", columns)?;
        let dtype_map: HashMap<String, ColumnType> = parse_artifact("dtypes", dtypes)?;
        let spec: PipelineSpec = parse_artifact("pipeline", pipeline)?;

        let schema = Schema::new(column_list, &dtype_map)?;
        let pipeline_model = LogisticPipeline::compile(spec, &schema)?;

        let digest = Sha256::digest(pipeline.as_bytes());
        Ok(Self {
            schema,
            pipeline: pipeline_model,
            fingerprint: format!("{digest:x}"),
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Hex SHA-256 of the pipeline artifact.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..12.min(self.fingerprint.len())]
    }

    #[must_use]
    pub fn encoded_width(&self) -> usize {
        self.pipeline.encoded_width()
    }

    #[must_use]
    pub fn coerce(&self, observation: &Value) -> ObservationRow {
        self.schema.coerce(observation)
    }

    /// Coerce then score one observation.
    #[must_use]
    pub fn score(&self, observation: &Value) -> f64 {
        self.pipeline.predict_proba(&self.coerce(observation))
    }
}

fn read_artifact(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| PsError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_artifact<T: DeserializeOwned>(name: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|err| PsError::ArtifactParse {
        path: name.into(),
        details: err.to_string(),
    })
}

// Parse errors from `from_sources` only know the artifact's role; swap in the real path.
fn attach_path(err: PsError, config: &ArtifactConfig) -> PsError {
    match err {
        PsError::ArtifactParse { path, details } => {
            let real = match path.to_str() {
                Some("columns") => config.columns_path(),
                Some("dtypes") => config.dtypes_path(),
                _ => config.pipeline_path(),
            };
            PsError::ArtifactParse { path: real, details }
        }
        other => other,
    }
}
