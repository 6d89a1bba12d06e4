//! Process-wide logging: `log` facade with an `env_logger` backend.
//!
//! `RUST_LOG` overrides the default filter; actix access lines go through the
//! same backend.

use std::io::Write as _;

use env_logger::{Builder, Env};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global logger. `verbose` raises this crate to `debug`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER));
    if verbose {
        builder.filter_module("prediction_service", log::LevelFilter::Debug);
    }
    builder.format(|buf, record| {
        let ts = buf.timestamp_millis();
        let (level, target) = (record.level(), record.target());
        writeln!(buf, "{ts} {level:<5} [{target}] {}", record.args())
    });
    if builder.try_init().is_err() {
        log::debug!("logger already initialised");
    }
}
