//! Access to the `configs/` tree shipped at the workspace root.

use std::path::PathBuf;

use crate::tree::ConfigTree;

/// Path of the repository's `configs/` directory.
pub fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../configs")
        .canonicalize()
        .unwrap_or_else(|e| panic!("configs/ directory is missing: {e}"))
}

/// The shipped AlphaFold3 configs as a builder, ready to be tweaked and
/// written to a temporary directory.
pub fn alphafold3_configs() -> ConfigTree {
    ConfigTree::from_dir(&configs_dir())
}
