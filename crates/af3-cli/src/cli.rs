//! CLI argument parsing using clap derive

use std::path::PathBuf;

use af3_fs::ConfigFormat;
use clap::{Args, Parser, Subcommand};

/// AlphaFold3 config composer - build the run config for a training run
#[derive(Parser, Debug)]
#[command(name = "af3-compose")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding primary configs and config groups
    #[arg(short = 'd', long, env = "AF3_CONFIG_DIR", default_value = "configs", global = true)]
    pub config_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Compose and print a fully resolved run config
    ///
    /// Examples:
    ///   af3-compose compose                              # defaults of train.yaml
    ///   af3-compose compose experiment=large_crop        # with an experiment
    ///   af3-compose compose trainer=gpu data.crop_size=512
    ///   af3-compose compose -o run.json ~logger          # write to a file
    Compose(ComposeArgs),

    /// List config groups and their alternatives
    Groups,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ComposeArgs {
    /// Primary config to start from
    #[arg(short = 'c', long, default_value = "train")]
    pub config_name: String,

    /// Write the config to this file instead of stdout (format from extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format for stdout: yaml, json or toml
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,

    /// Print the selected alternative of each group instead of the config
    #[arg(long)]
    pub choices: bool,

    /// Overrides: group=name, key.path=value, +key=value, ++key=value, ~key
    pub overrides: Vec<String>,
}
