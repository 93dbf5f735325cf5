mod analysis;
mod catalog;
mod cli;
mod commands;
mod config;
mod error;
mod export;
mod model;
mod normalize;
mod stats;
mod store;
mod submission;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.global)?;

    match cli.command {
        Commands::Catalog(args) => commands::catalog::run(&config, args),
        Commands::Submit(args) => commands::submit::run(&config, args),
        Commands::Normalize(args) => commands::normalize::run(&config, args),
        Commands::Export(args) => commands::export::run(&config, args),
        Commands::Analyze(args) => commands::analyze::run(&config, args),
        Commands::Status(args) => commands::status::run(&config, args),
        Commands::ImportLegacy(args) => commands::import_legacy::run(&config, args),
        Commands::Reset(args) => commands::reset::run(&config, args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
