//! `predsvc` binary entrypoint.

use clap::Parser;

use prediction_service::cli_app::{self, Cli};
use prediction_service::logger;

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);
    if let Err(err) = cli_app::run(&cli) {
        log::error!("{err}");
        eprintln!("predsvc: {err}");
        std::process::exit(if err.is_startup_failure() { 3 } else { 1 });
    }
}
