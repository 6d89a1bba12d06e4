//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

use prediction_service::core::config::{ArtifactConfig, DuplicatePolicy};
use prediction_service::model::ModelArtifacts;
use prediction_service::server::AppContext;
use prediction_service::store::PredictionStore;
use prediction_service::store::sqlite::SqliteStore;
use tempfile::TempDir;

/// Probability the fixture pipeline assigns to the documented example passenger.
pub const EXAMPLE_PROBA: f64 = 0.092_641_792_971_274_45;

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn fixture_artifacts() -> ModelArtifacts {
    let config = ArtifactConfig {
        dir: fixtures_dir(),
        ..ArtifactConfig::default()
    };
    ModelArtifacts::load(&config).expect("fixtures load")
}

/// App context over a fresh file-backed SQLite database.
pub struct Harness {
    pub ctx: AppContext,
    pub db_path: PathBuf,
    _dir: TempDir,
}

pub fn harness(policy: DuplicatePolicy) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("predictions.db");
    let store = SqliteStore::open(&db_path).expect("open sqlite");
    store.ensure_schema().expect("schema");
    Harness {
        ctx: AppContext::new(Arc::new(fixture_artifacts()), Arc::new(store), policy),
        db_path,
        _dir: dir,
    }
}

pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Run the `predsvc` binary with an isolated environment and keep its output
/// on disk for post-mortem inspection.
pub fn run_cli_case(case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CliResult {
    let mut command = Command::new(env!("CARGO_BIN_EXE_predsvc"));
    command
        .args(args)
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "warn");
    for (key, value) in envs {
        command.env(key, value);
    }
    let Output {
        status,
        stdout,
        stderr,
    } = command.output().expect("spawn predsvc");
    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    let log_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("cli-cases");
    fs::create_dir_all(&log_dir).expect("log dir");
    let log_path = log_dir.join(format!("{case_name}.log"));
    fs::write(
        &log_path,
        format!("args: {args:?}\nstatus: {status}\n--- stdout\n{stdout}\n--- stderr\n{stderr}\n"),
    )
    .expect("write case log");

    CliResult {
        status,
        stdout,
        stderr,
        log_path,
    }
}
