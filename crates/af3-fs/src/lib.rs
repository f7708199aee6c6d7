//! Filesystem layer for AlphaFold3 config composition
//!
//! Knows how to find config files on disk, detect their format from the
//! file extension, and read or write them safely. It knows nothing about
//! what the documents mean; that lives in `af3-config`.

pub mod error;
pub mod format;
pub mod io;
pub mod scan;
pub mod store;

pub use error::{Error, Result};
pub use format::ConfigFormat;
pub use scan::{ConfigFile, scan_config_dir};
pub use store::{ConfigStore, DEFAULT_MAX_FILE_SIZE};
