//! Application context and the synchronous request orchestration behind each route.

#![allow(missing_docs)]

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::core::config::DuplicatePolicy;
use crate::core::errors::{PsError, Result};
use crate::model::ModelArtifacts;
use crate::store::{self, NewPrediction, PredictionRecord, PredictionStore};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub model: Arc<ModelArtifacts>,
    pub store: Arc<dyn PredictionStore>,
    pub policy: DuplicatePolicy,
}

/// Body of `POST /predict`.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub id: i64,
    /// Observation text exactly as submitted. Absent and `null` both read as `None`.
    #[serde(default)]
    pub observation: Option<Box<RawValue>>,
}

impl PredictRequest {
    /// The observation as it is persisted.
    #[must_use]
    pub fn raw_observation(&self) -> &str {
        self.observation.as_deref().map_or("null", RawValue::get)
    }
}

/// Reply to `POST /predict`. Duplicate ids under the reject policy still carry
/// the freshly computed probability alongside the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub proba: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /update`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub id: i64,
    #[serde(deserialize_with = "int_or_bool")]
    pub true_class: i64,
}

/// Labels may arrive as `0`/`1` or as JSON booleans.
fn int_or_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Int(i64),
        Bool(bool),
    }
    Ok(match Label::deserialize(deserializer)? {
        Label::Int(v) => v,
        Label::Bool(v) => i64::from(v),
    })
}

/// Error-only reply body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Reply to `POST /update`: the full record, or an error for unknown ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateResponse {
    Record(PredictionRecord),
    Error(ErrorBody),
}

/// Reply to `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub backend: &'static str,
    pub duplicate_policy: DuplicatePolicy,
    pub model_fingerprint: String,
    pub columns: Vec<String>,
}

impl AppContext {
    #[must_use]
    pub fn new(
        model: Arc<ModelArtifacts>,
        store: Arc<dyn PredictionStore>,
        policy: DuplicatePolicy,
    ) -> Self {
        Self {
            model,
            store,
            policy,
        }
    }

    /// Score an observation and record it under the configured duplicate policy.
    pub fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        let raw = request.raw_observation();
        let observation: Value = serde_json::from_str(raw)?;
        let proba = self.model.score(&observation);
        let new = NewPrediction::new(request.id, raw, proba);
        match store::record_prediction(self.store.as_ref(), self.policy, &new) {
            Ok(record) => {
                log::debug!(
                    "recorded prediction observation_id={} proba={:.6}",
                    record.observation_id,
                    record.proba
                );
                Ok(PredictResponse {
                    proba: record.proba,
                    error: None,
                })
            }
            Err(err @ PsError::DuplicateObservation { .. }) => {
                log::warn!("{err}");
                Ok(PredictResponse {
                    proba,
                    error: Some(err.client_message()),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Attach a ground-truth label to a recorded prediction.
    pub fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse> {
        match self.store.attach_outcome(request.id, request.true_class) {
            Ok(record) => Ok(UpdateResponse::Record(record)),
            Err(err @ PsError::ObservationNotFound { .. }) => {
                log::warn!("{err}");
                Ok(UpdateResponse::Error(ErrorBody::new(err.client_message())))
            }
            Err(err) => Err(err),
        }
    }

    pub fn list(&self) -> Result<Vec<PredictionRecord>> {
        self.store.list()
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            backend: self.store.backend_name(),
            duplicate_policy: self.policy,
            model_fingerprint: self.model.fingerprint().to_string(),
            columns: self
                .model
                .schema()
                .column_names()
                .map(str::to_string)
                .collect(),
        }
    }
}
