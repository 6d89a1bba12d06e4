//! Model side of the service: artifact loading, observation coercion, scoring.

pub mod artifacts;
pub mod coerce;
pub mod pipeline;

pub use artifacts::ModelArtifacts;
pub use coerce::{Cell, ColumnType, ObservationRow, Schema};
pub use pipeline::{Classifier, LogisticPipeline, PipelineSpec};
