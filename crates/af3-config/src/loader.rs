//! Populating a [`ConfigRegistry`] from a config directory
//!
//! ```text
//! configs/
//!   train.yaml            primary config `train`
//!   data/pdb.yaml         group `data`, alternative `pdb`
//!   model/net/small.yaml  group `model/net`, alternative `small`
//! ```

use std::path::Path;

use af3_fs::{ConfigFile, ConfigStore, scan_config_dir};

use crate::registry::ConfigRegistry;
use crate::value::{ConfigNode, Value};
use crate::{Error, Result};

/// Loads every config file under a directory into a registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryLoader {
    store: ConfigStore,
}

impl RegistryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: ConfigStore) -> Self {
        Self { store }
    }

    /// Scan `root` and load each file found.
    ///
    /// Fails on the first file that cannot be read or parsed, on a document
    /// that is not a mapping, and on two files claiming the same group and
    /// name (e.g. `data/pdb.yaml` next to `data/pdb.json`).
    pub fn load(&self, root: &Path) -> Result<ConfigRegistry> {
        let files = scan_config_dir(root)?;
        let mut registry = ConfigRegistry::new();

        for file in &files {
            let node = self.load_node(file)?;
            let duplicate = match &file.group {
                Some(group) => registry.has_option(group, &file.name),
                None => registry.has_primary(&file.name),
            };
            if duplicate {
                return Err(Error::InvalidDocument {
                    path: file.path.clone(),
                    message: format!("duplicate config `{}`", qualified_name(file)),
                });
            }

            match &file.group {
                Some(group) => registry.register(group, file.name.clone(), node),
                None => registry.register_primary(file.name.clone(), node),
            }
        }

        tracing::debug!(
            root = %root.display(),
            groups = registry.groups().len(),
            configs = registry.len(),
            "Loaded config registry"
        );
        Ok(registry)
    }

    fn load_node(&self, file: &ConfigFile) -> Result<ConfigNode> {
        match self.store.load::<Value>(&file.path)? {
            Value::Node(node) => Ok(node),
            Value::Null => Ok(ConfigNode::new()),
            other => Err(Error::InvalidDocument {
                path: file.path.clone(),
                message: format!("expected a mapping at the top level, found a {}", other.kind()),
            }),
        }
    }
}

fn qualified_name(file: &ConfigFile) -> String {
    match &file.group {
        Some(group) => format!("{group}/{}", file.name),
        None => file.name.clone(),
    }
}
