//! Scoring pipeline: per-column preprocessing followed by logistic regression.

use serde::{Deserialize, Serialize};

use super::coerce::{ColumnType, ObservationRow, Schema};
use crate::core::errors::{PsError, Result};

/// Anything that turns a coerced row into a positive-class probability.
pub trait Classifier: Send + Sync {
    /// Probability of the positive class, always within `[0, 1]`.
    fn predict_proba(&self, row: &ObservationRow) -> f64;
}

fn unit_scale() -> f64 {
    1.0
}

/// One preprocessing step as written in `pipeline.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSpec {
    /// Impute with `fill`, then standardize as `(v - center) / scale`.
    Numeric {
        column: String,
        fill: f64,
        #[serde(default)]
        center: f64,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    /// One-hot over `categories`; missing or unseen values encode as all zeros.
    Categorical {
        column: String,
        categories: Vec<String>,
    },
}

impl FeatureSpec {
    fn column(&self) -> &str {
        match self {
            Self::Numeric { column, .. } | Self::Categorical { column, .. } => column,
        }
    }
}

/// Serialized form of the pipeline artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub features: Vec<FeatureSpec>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Numeric {
        index: usize,
        fill: f64,
        center: f64,
        scale: f64,
    },
    OneHot {
        index: usize,
        categories: Vec<String>,
    },
}

impl Step {
    fn width(&self) -> usize {
        match self {
            Self::Numeric { .. } => 1,
            Self::OneHot { categories, .. } => categories.len(),
        }
    }

    fn encode_into(&self, row: &ObservationRow, out: &mut Vec<f64>) {
        match self {
            Self::Numeric {
                index,
                fill,
                center,
                scale,
            } => {
                let value = row.cell(*index).as_f64().unwrap_or(*fill);
                out.push((value - center) / scale);
            }
            Self::OneHot { index, categories } => {
                let label = row.cell(*index).as_category();
                for category in categories {
                    let hit = label.as_ref() == Some(category);
                    out.push(if hit { 1.0 } else { 0.0 });
                }
            }
        }
    }
}

/// A pipeline bound to a schema, ready to score rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticPipeline {
    steps: Vec<Step>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticPipeline {
    /// Resolve feature columns against `schema` and check the coefficient shape.
    pub fn compile(spec: PipelineSpec, schema: &Schema) -> Result<Self> {
        let invalid = |details: String| PsError::InvalidPipeline { details };

        if spec.features.is_empty() {
            return Err(invalid("pipeline has no features".to_string()));
        }

        let mut steps = Vec::with_capacity(spec.features.len());
        for feature in spec.features {
            let Some(index) = schema.index_of(feature.column()) else {
                let column = feature.column();
                return Err(PsError::SchemaMismatch {
                    details: format!("pipeline feature {column:?} is not a listed column"),
                });
            };
            let step = match feature {
                FeatureSpec::Numeric {
                    column,
                    fill,
                    center,
                    scale,
                } => {
                    if schema.column_type(index) == Some(ColumnType::Str) {
                        return Err(PsError::SchemaMismatch {
                            details: format!("numeric feature {column:?} is a string column"),
                        });
                    }
                    if !(fill.is_finite() && center.is_finite()) {
                        return Err(invalid(format!(
                            "feature {column:?} has a non-finite fill or center"
                        )));
                    }
                    if !scale.is_finite() || scale == 0.0 {
                        return Err(invalid(format!(
                            "feature {column:?} has an unusable scale {scale}"
                        )));
                    }
                    Step::Numeric {
                        index,
                        fill,
                        center,
                        scale,
                    }
                }
                FeatureSpec::Categorical { column, categories } => {
                    if categories.is_empty() {
                        return Err(invalid(format!(
                            "categorical feature {column:?} has no categories"
                        )));
                    }
                    let mut seen = std::collections::HashSet::new();
                    if let Some(dup) = categories.iter().find(|c| !seen.insert(c.as_str())) {
                        return Err(invalid(format!(
                            "categorical feature {column:?} repeats category {dup:?}"
                        )));
                    }
                    Step::OneHot { index, categories }
                }
            };
            steps.push(step);
        }

        let width: usize = steps.iter().map(Step::width).sum();
        if spec.coefficients.len() != width {
            return Err(invalid(format!(
                "expected {width} coefficients for the encoded features, found {}",
                spec.coefficients.len()
            )));
        }
        if !spec.intercept.is_finite() || spec.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(invalid("coefficients must be finite".to_string()));
        }

        Ok(Self {
            steps,
            coefficients: spec.coefficients,
            intercept: spec.intercept,
        })
    }

    /// Number of model inputs after encoding.
    #[must_use]
    pub fn encoded_width(&self) -> usize {
        self.coefficients.len()
    }

    /// Encoded feature vector for one row.
    #[must_use]
    pub fn encode(&self, row: &ObservationRow) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.encoded_width());
        for step in &self.steps {
            step.encode_into(row, &mut out);
        }
        out
    }

    /// Linear score before the logistic link.
    #[must_use]
    pub fn decision_function(&self, row: &ObservationRow) -> f64 {
        self.encode(row)
            .iter()
            .zip(&self.coefficients)
            .fold(self.intercept, |acc, (x, w)| acc + x * w)
    }
}

impl Classifier for LogisticPipeline {
    fn predict_proba(&self, row: &ObservationRow) -> f64 {
        sigmoid(self.decision_function(row))
    }
}

/// Logistic link, stable for large magnitudes.
#[must_use]
pub fn sigmoid(z: f64) -> f64 {
    if z.is_nan() {
        return 0.5;
    }
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
