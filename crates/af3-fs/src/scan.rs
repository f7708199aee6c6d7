//! Discovery of config documents under a config directory
//!
//! ```text
//! configs/
//!   train.yaml            <- primary config (group = None)
//!   data/
//!     pdb.yaml            <- group "data", name "pdb"
//!   model/
//!     alphafold3.yaml
//!     net/
//!       small.toml        <- group "model/net", name "small"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::{ConfigFormat, Error, Result};

/// A config document found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// `/`-joined directory path relative to the scan root, `None` at the root.
    pub group: Option<String>,
    /// File stem.
    pub name: String,
    pub path: PathBuf,
    pub format: ConfigFormat,
}

/// Recursively list config documents under `root`, sorted by group then name.
///
/// Files whose extension is not a known config format are skipped, as are
/// hidden files and directories. Symlinked directories are not followed;
/// symlinked files are read like any other file.
pub fn scan_config_dir(root: &Path) -> Result<Vec<ConfigFile>> {
    let mut files = Vec::new();
    scan_into(root, None, &mut files)?;
    files.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));
    Ok(files)
}

fn scan_into(dir: &Path, group: Option<&str>, files: &mut Vec<ConfigFile>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;
        if file_type.is_symlink() && path.is_dir() {
            tracing::warn!(?path, "Skipping symlinked config directory");
            continue;
        }

        if file_type.is_dir() {
            let child_group = match group {
                Some(parent) => format!("{parent}/{file_name}"),
                None => file_name,
            };
            scan_into(&path, Some(&child_group), files)?;
            continue;
        }

        let Some(format) = ConfigFormat::from_path(&path) else {
            tracing::debug!(?path, "Skipping non-config file");
            continue;
        };
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };

        files.push(ConfigFile {
            group: group.map(str::to_string),
            name,
            path,
            format,
        });
    }

    Ok(())
}
