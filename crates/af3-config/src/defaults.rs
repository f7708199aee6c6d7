//! Defaults lists and override directives
//!
//! A primary config names the alternatives it is built from:
//!
//! ```yaml
//! defaults:
//!   - _self_
//!   - data: pdb
//!   - model: alphafold3
//!   - optional logger: wandb
//!   - experiment: null
//! ```
//!
//! An experiment overlay swaps whole groups with override directives,
//! either in its own defaults list or as top-level keys:
//!
//! ```yaml
//! defaults:
//!   - override /data: atom
//! "override trainer": gpu
//! ```

use crate::registry::normalize_group;
use crate::value::{ConfigNode, Value};
use crate::{Error, Result};

/// Key holding the defaults list.
pub const DEFAULTS_KEY: &str = "defaults";
/// Defaults entry marking where a config's own body is merged.
pub const SELF_ENTRY: &str = "_self_";

const OVERRIDE_KEYWORD: &str = "override";
const OPTIONAL_KEYWORD: &str = "optional";

/// Replace a group's subtree wholesale with another alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideDirective {
    pub group: String,
    /// `None` clears the group's subtree.
    pub name: Option<String>,
}

impl OverrideDirective {
    pub fn new(group: impl Into<String>, name: Option<String>) -> Self {
        Self {
            group: normalize_group(&group.into()),
            name,
        }
    }

    /// Remove every override directive from `overlay` and return them in
    /// declaration order: defaults-list entries first, then top-level
    /// `override <group>` keys.
    ///
    /// The overlay's `defaults` key is consumed; it may hold only override
    /// entries and `_self_`.
    pub fn extract(overlay: &mut ConfigNode) -> Result<Vec<OverrideDirective>> {
        let mut directives = Vec::new();

        if overlay.contains_key(DEFAULTS_KEY) {
            let defaults = DefaultsList::extract(overlay)?;
            for entry in defaults.entries {
                match entry {
                    DefaultEntry::Override(directive) => directives.push(directive),
                    DefaultEntry::SelfContent => {}
                    DefaultEntry::Select { group, .. } => {
                        return Err(Error::InvalidDefaults {
                            message: format!(
                                "overlays may only override groups; use `override /{group}`"
                            ),
                        });
                    }
                }
            }
        }

        let keys: Vec<String> = overlay
            .keys()
            .filter(|key| parse_key(key).0 == Keyword::Override)
            .map(str::to_string)
            .collect();
        for key in keys {
            let (_, group, _) = parse_key(&key);
            let value = overlay.remove(&key).unwrap_or(Value::Null);
            let name = option_name(&value, &key)?;
            directives.push(OverrideDirective::new(group, name));
        }

        Ok(directives)
    }
}

/// One entry of a defaults list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultEntry {
    /// `_self_`: the config's own body
    SelfContent,
    /// `group: name`, `group: null` or `optional group: name`
    Select {
        group: String,
        name: Option<String>,
        optional: bool,
        /// Written `/group`: named from the config root, never relative to
        /// the group whose alternative holds the list.
        absolute: bool,
    },
    /// `override group: name`
    Override(OverrideDirective),
}

/// Ordered defaults list of a config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultsList {
    entries: Vec<DefaultEntry>,
}

impl DefaultsList {
    pub fn new(entries: Vec<DefaultEntry>) -> Self {
        Self { entries }
    }

    /// Remove and parse the `defaults` key of `node`. A node without one has
    /// an empty list.
    pub fn extract(node: &mut ConfigNode) -> Result<Self> {
        let Some(raw) = node.remove(DEFAULTS_KEY) else {
            return Ok(Self::default());
        };
        let items = match raw {
            Value::Sequence(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(Error::InvalidDefaults {
                    message: format!("expected a sequence, found a {}", other.kind()),
                });
            }
        };

        let entries = items.iter().map(parse_entry).collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DefaultEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<DefaultEntry> {
        &mut self.entries
    }

    pub fn has_self(&self) -> bool {
        self.entries.contains(&DefaultEntry::SelfContent)
    }

    /// The selection entry for `group`, if the list has one.
    pub fn selection_mut(&mut self, group: &str) -> Option<&mut DefaultEntry> {
        let group = normalize_group(group);
        self.entries
            .iter_mut()
            .find(|entry| matches!(entry, DefaultEntry::Select { group: g, .. } if *g == group))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Keyword {
    None,
    Override,
    Optional,
}

/// Split a defaults key like `override /data` into keyword and group.
/// The flag is set when the group carries a leading `/`.
fn parse_key(key: &str) -> (Keyword, String, bool) {
    let key = key.trim();
    let (keyword, group) = match key.split_once(char::is_whitespace) {
        Some((OVERRIDE_KEYWORD, group)) => (Keyword::Override, group.trim()),
        Some((OPTIONAL_KEYWORD, group)) => (Keyword::Optional, group.trim()),
        _ => (Keyword::None, key),
    };
    (keyword, normalize_group(group), group.starts_with('/'))
}

fn option_name(value: &Value, key: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(name) => Ok(Some(name.clone())),
        Value::Integer(_) | Value::Float(_) | Value::Bool(_) => Ok(value.render_scalar()),
        other => Err(Error::InvalidDefaults {
            message: format!("`{key}` must name an alternative, found a {}", other.kind()),
        }),
    }
}

fn parse_entry(item: &Value) -> Result<DefaultEntry> {
    match item {
        Value::String(s) if s == SELF_ENTRY => Ok(DefaultEntry::SelfContent),
        Value::Node(node) if node.len() == 1 => {
            let Some((key, value)) = node.iter().next() else {
                return Err(Error::InvalidDefaults {
                    message: "empty entry".to_string(),
                });
            };
            let (keyword, group, absolute) = parse_key(key);
            if group.is_empty() {
                return Err(Error::InvalidDefaults {
                    message: format!("entry `{key}` does not name a group"),
                });
            }
            let name = option_name(value, key)?;
            Ok(match keyword {
                Keyword::Override => DefaultEntry::Override(OverrideDirective::new(group, name)),
                Keyword::Optional => DefaultEntry::Select {
                    group,
                    name,
                    optional: true,
                    absolute,
                },
                Keyword::None => DefaultEntry::Select {
                    group,
                    name,
                    optional: false,
                    absolute,
                },
            })
        }
        Value::String(s) => Err(Error::InvalidDefaults {
            message: format!("unsupported entry `{s}`; expected `group: name` or `{SELF_ENTRY}`"),
        }),
        other => Err(Error::InvalidDefaults {
            message: format!("unsupported {} entry", other.kind()),
        }),
    }
}
