//! Shared test utilities for the AlphaFold3 config workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`tree`]: [`ConfigTree`] builder for config directories on disk
//! - [`alphafold3`]: the config tree shipped with the repository

pub mod alphafold3;
pub mod tree;

pub use alphafold3::{alphafold3_configs, configs_dir};
pub use tree::{ConfigDir, ConfigTree};
