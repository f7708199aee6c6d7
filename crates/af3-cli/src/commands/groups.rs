//! Groups command

use std::path::Path;

use colored::Colorize;

use super::load_registry;
use crate::error::Result;

/// Run the groups command
pub fn run_groups(config_dir: &Path) -> Result<()> {
    let registry = load_registry(config_dir)?;

    println!("{} {}", "Config groups in".bold(), config_dir.display());
    println!();
    for group in registry.groups() {
        println!(
            "  {:<14} {}",
            group.green(),
            registry.options(group).join(", ")
        );
    }
    println!();
    println!(
        "{} {}",
        "Primary configs:".dimmed(),
        registry.primaries().join(", ")
    );

    Ok(())
}
