//! Prediction service: scores JSON observations with a pre-trained binary
//! classifier, records each prediction keyed by its observation id, and later
//! attaches the ground-truth label once it is known.
//!
//! Predictions persist to SQLite by default, or PostgreSQL when `DATABASE_URL`
//! is set at startup.

#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
#[cfg(feature = "cli")]
pub mod logger;
pub mod model;
pub mod server;
pub mod store;

pub use crate::core::errors::{PsError, Result};
