//! AlphaFold3 config composer
//!
//! Composes the run configuration for a training run from the config
//! directory, an optional experiment and command-line overrides.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: logging disabled: {}", "warning".yellow().bold(), e);
    }

    match cli.command {
        Commands::Compose(args) => commands::run_compose(&cli.config_dir, &args),
        Commands::Groups => commands::run_groups(&cli.config_dir),
    }
}
