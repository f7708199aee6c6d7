//! Registry of named config alternatives
//!
//! Maps each config group ("data", "model", "trainer", ...) to its named
//! alternatives, and holds the primary configs that carry a defaults list.
//! The registry is built once, then only read: composers borrow it, so a
//! sweep can compose many runs against one shared registry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::value::ConfigNode;
use crate::{Error, Result};

/// A `(group, name)` pair choosing one alternative of a config group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupSelection {
    pub group: String,
    pub name: String,
}

impl GroupSelection {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: normalize_group(&group.into()),
            name: name.into(),
        }
    }
}

impl FromStr for GroupSelection {
    type Err = Error;

    /// Parse `group=name`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((group, name)) if !group.trim().is_empty() && !name.trim().is_empty() => {
                Ok(Self::new(group.trim(), name.trim()))
            }
            _ => Err(Error::InvalidOverride {
                spec: s.to_string(),
                message: "expected `group=name`".to_string(),
            }),
        }
    }
}

impl fmt::Display for GroupSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.group, self.name)
    }
}

/// Strip leading and trailing `/` so `/data` and `data` name one group.
pub fn normalize_group(group: &str) -> String {
    group.trim().trim_matches('/').to_string()
}

/// Named config alternatives per group, plus primary configs.
///
/// # Example
///
/// ```
/// use af3_config::{ConfigNode, ConfigRegistry};
///
/// let mut registry = ConfigRegistry::new();
/// registry.register("data", "pdb", ConfigNode::new());
/// assert!(registry.has_option("data", "pdb"));
/// assert!(registry.get("data", "atom").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    groups: BTreeMap<String, BTreeMap<String, ConfigNode>>,
    primaries: BTreeMap<String, ConfigNode>,
}

impl ConfigRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alternative for a group.
    ///
    /// If the alternative was already registered, it is replaced.
    pub fn register(&mut self, group: &str, name: impl Into<String>, node: ConfigNode) {
        self.groups
            .entry(normalize_group(group))
            .or_default()
            .insert(name.into(), node);
    }

    /// Register a primary config (one that carries a defaults list).
    pub fn register_primary(&mut self, name: impl Into<String>, node: ConfigNode) {
        self.primaries.insert(name.into(), node);
    }

    /// Get an alternative by group and name.
    pub fn get(&self, group: &str, name: &str) -> Result<&ConfigNode> {
        let group = normalize_group(group);
        self.groups
            .get(&group)
            .and_then(|options| options.get(name))
            .ok_or_else(|| Error::NotFound {
                group,
                name: name.to_string(),
            })
    }

    /// Get a primary config by name.
    pub fn primary(&self, name: &str) -> Result<&ConfigNode> {
        self.primaries
            .get(name)
            .ok_or_else(|| Error::PrimaryNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(&normalize_group(group))
    }

    pub fn has_option(&self, group: &str, name: &str) -> bool {
        self.groups
            .get(&normalize_group(group))
            .is_some_and(|options| options.contains_key(name))
    }

    pub fn has_primary(&self, name: &str) -> bool {
        self.primaries.contains_key(name)
    }

    /// Sorted group names.
    pub fn groups(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Sorted alternative names of `group`; empty for unknown groups.
    pub fn options(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(&normalize_group(group))
            .map(|options| options.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Sorted primary config names.
    pub fn primaries(&self) -> Vec<&str> {
        self.primaries.keys().map(String::as_str).collect()
    }

    /// Total number of registered alternatives across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    /// Check if the registry holds no alternatives and no primaries.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.primaries.is_empty()
    }
}
