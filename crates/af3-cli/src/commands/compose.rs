//! Compose command

use std::path::Path;

use af3_config::{CommandLineOverride, Composer};
use af3_fs::ConfigStore;
use colored::Colorize;

use super::load_registry;
use crate::cli::ComposeArgs;
use crate::error::Result;

/// Run the compose command
pub fn run_compose(config_dir: &Path, args: &ComposeArgs) -> Result<()> {
    let registry = load_registry(config_dir)?;
    let overrides = args
        .overrides
        .iter()
        .map(|spec| spec.parse::<CommandLineOverride>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let composition = Composer::new(&registry).compose_run(&args.config_name, &overrides)?;
    tracing::debug!(
        config = %args.config_name,
        overrides = overrides.len(),
        "Composed run config"
    );

    if args.choices {
        for (group, name) in &composition.choices {
            println!("{group}: {name}");
        }
        return Ok(());
    }

    let store = ConfigStore::new();
    match &args.output {
        Some(path) => {
            store.save(path, &composition.config)?;
            eprintln!(
                "{} Wrote {} config to {}",
                "OK".green().bold(),
                args.config_name,
                path.display()
            );
        }
        None => {
            let rendered = store.render(&composition.config, args.format, Path::new("<stdout>"))?;
            print!("{rendered}");
        }
    }

    Ok(())
}
