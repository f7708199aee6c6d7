//! Command implementations for af3-cli

pub mod compose;
pub mod groups;

pub use compose::run_compose;
pub use groups::run_groups;

use std::path::Path;

use af3_config::{ConfigRegistry, RegistryLoader};

use crate::error::{CliError, Result};

/// Load every config below `config_dir`.
fn load_registry(config_dir: &Path) -> Result<ConfigRegistry> {
    if !config_dir.is_dir() {
        return Err(CliError::user(format!(
            "Config directory not found: {} (use --config-dir or AF3_CONFIG_DIR)",
            config_dir.display()
        )));
    }
    Ok(RegistryLoader::new().load(config_dir)?)
}
