//! Error types for af3-config

use std::path::PathBuf;

use crate::path::KeyPath;

/// Result type for af3-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading, composing or resolving a run configuration.
///
/// Composition is all-or-nothing: any of these aborts the run and no
/// partially composed tree is returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `(group, name)` pair is not in the registry
    #[error("Config not found: {group}/{name}")]
    NotFound { group: String, name: String },

    /// A primary config is not in the registry
    #[error("Primary config not found: {name}")]
    PrimaryNotFound { name: String },

    /// Incompatible value kinds meet at the same key path during a merge
    #[error("Merge conflict at {path}: cannot merge {incoming} into {existing}")]
    MergeConflict {
        path: KeyPath,
        existing: &'static str,
        incoming: &'static str,
    },

    /// An interpolation points at a key that does not exist after merging
    #[error("Unresolved reference ${{{reference}}} at {at}")]
    UnresolvedReference { reference: String, at: KeyPath },

    /// Interpolations form a cycle
    #[error("Circular reference: {}", chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    /// A placeholder expression is malformed or used where its value cannot go
    #[error("Invalid placeholder `{expression}` at {at}: {message}")]
    InvalidPlaceholder {
        at: KeyPath,
        expression: String,
        message: String,
    },

    /// A `${name:...}` call names a resolver that does not exist
    #[error("Unknown resolver `{name}` at {at}")]
    UnknownResolver { at: KeyPath, name: String },

    /// A resolver rejected its arguments
    #[error("Resolver `{name}` failed at {at}: {message}")]
    ResolverFailed {
        at: KeyPath,
        name: String,
        message: String,
    },

    #[error("Invalid key path `{path}`: {message}")]
    InvalidKeyPath { path: String, message: String },

    #[error("Invalid defaults list: {message}")]
    InvalidDefaults { message: String },

    #[error("Invalid override `{spec}`: {message}")]
    InvalidOverride { spec: String, message: String },

    #[error("Invalid config document {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error(transparent)]
    Fs(#[from] af3_fs::Error),
}
