//! Policydrift CLI: the `policydrift` command.

mod cli;
mod commands;
mod config;
mod render;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use std::process;

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("policydrift=debug,policydrift_kernel=debug,policydrift_baseline=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => error.exit(),
        Err(error) => {
            // Usage errors exit 3, never clap's 2.
            eprint!("{error}");
            process::exit(support::ERROR_EXIT);
        }
    };
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compare(args) => commands::compare::run(args),
        Commands::Normalize { field, value, json } => commands::normalize::run(field, value, json),
        Commands::Tables { json } => commands::tables::run(json),
    }
}
