//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{Value, json};

use crate::core::config::Config;
use crate::core::errors::{PsError, Result};
use crate::model::ModelArtifacts;
use crate::server::{self, AppContext};
use crate::store;

/// Prediction service: scores observations and records their outcomes.
#[derive(Parser)]
#[command(name = "predsvc", version, about)]
pub struct Cli {
    /// Path to a TOML config file (default: ./predsvc.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging for this crate.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Load the model, open the store, and serve HTTP requests.
    Serve,
    /// Create the predictions table in the configured backend.
    InitDb,
    /// Print every recorded prediction.
    List {
        /// Emit a JSON array instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Load and cross-check the model artifacts, then print a summary.
    CheckArtifacts,
    /// Score one observation without recording it. Use `-` to read stdin.
    Score {
        input: PathBuf,
    },
    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<()> {
    if let Command::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "predsvc", &mut io::stdout());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Serve => serve(&config),
        Command::InitDb => {
            let backend = config.backend()?;
            store::open(&backend)?;
            println!("predictions table ready in {backend}");
            Ok(())
        }
        Command::List { json } => list(&config, *json),
        Command::CheckArtifacts => check_artifacts(&config),
        Command::Score { input } => score(&config, input),
        Command::Completions { .. } => Ok(()),
    }
}

fn serve(config: &Config) -> Result<()> {
    let model = ModelArtifacts::load(&config.artifacts)?;
    let backend = config.backend()?;
    log::info!(
        "backend {backend}, duplicate policy {:?}",
        config.store.duplicate_policy
    );
    // The store is opened before the HTTP runtime starts; the blocking
    // postgres client cannot be created from inside an async executor.
    let store = store::open(&backend)?;
    let ctx = AppContext::new(Arc::new(model), store, config.store.duplicate_policy);
    server::run(&config.server, ctx)
}

fn list(config: &Config, as_json: bool) -> Result<()> {
    let store = store::open(&config.backend()?)?;
    let records = store.list()?;
    let mut out = io::stdout().lock();
    if as_json {
        serde_json::to_writer_pretty(&mut out, &records)?;
        writeln!(out).map_err(|source| PsError::io("<stdout>", source))?;
        return Ok(());
    }
    let mut write = |line: String| {
        writeln!(out, "{line}").map_err(|source| PsError::io("<stdout>", source))
    };
    write(format!(
        "{:>6} {:>14} {:>10} {:>10}",
        "id", "observation_id", "proba", "true_class"
    ))?;
    for record in &records {
        let label = record
            .true_class
            .map_or_else(|| "-".to_string(), |label| label.to_string());
        write(format!(
            "{:>6} {:>14} {:>10.6} {:>10}",
            record.id, record.observation_id, record.proba, label
        ))?;
    }
    write(format!("{} record(s)", records.len()))
}

fn check_artifacts(config: &Config) -> Result<()> {
    let model = ModelArtifacts::load(&config.artifacts)?;
    println!("artifact dir      : {}", config.artifacts.dir.display());
    println!("columns           : {}", model.schema().len());
    for (index, name) in model.schema().column_names().enumerate() {
        let dtype = model
            .schema()
            .column_type(index)
            .map_or("?", |dtype| dtype.as_str());
        println!("  {name:<20} {dtype}");
    }
    println!("encoded features  : {}", model.encoded_width());
    println!("pipeline sha256   : {}", model.fingerprint());
    Ok(())
}

fn score(config: &Config, input: &Path) -> Result<()> {
    let model = ModelArtifacts::load(&config.artifacts)?;
    let raw = read_input(input)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    // Accept either a bare observation or a full `/predict` body.
    let observation = parsed.get("observation").cloned().unwrap_or(parsed);
    let row = model.coerce(&observation);
    let report = json!({
        "proba": model.score(&observation),
        "missing": row.missing_columns(),
        "row": row,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| PsError::io("<stdin>", source))?;
        return Ok(buf);
    }
    fs::read_to_string(input).map_err(|source| PsError::io(input, source))
}
