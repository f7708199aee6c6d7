//! Command-line overrides
//!
//! ```text
//! data=atom                  select an alternative for a group
//! +logger=csv                add a group selection
//! data.crop_size=5120        replace an existing value
//! +trainer.profiler=simple   add a new key
//! ++model.compile=true       add or replace
//! ~callbacks.early_stopping  delete a key
//! ```

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::path::KeyPath;
use crate::value::{ConfigNode, Value};
use crate::{Error, Result};

/// What an override does to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    /// `key=value`: the key must already exist
    Set,
    /// `+key=value`: the key must not exist yet
    Add,
    /// `++key=value`: add or replace
    ForceAdd,
    /// `~key` or `~key=value`: the key must exist (and match `value` if given)
    Delete,
}

/// A parsed `key=value` command-line override.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLineOverride {
    pub action: OverrideAction,
    /// Key exactly as written, used to detect group selections like `model/net`.
    pub key: String,
    pub value: Option<Value>,
    spec: String,
}

static OVERRIDE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>\+\+|\+|~)?(?P<key>[A-Za-z0-9_\-./\[\]@]+)(?:=(?P<value>.*))?$")
        .expect("Invalid override regex")
});

impl CommandLineOverride {
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// The key as a dotted path into the config tree.
    pub fn path(&self) -> Result<KeyPath> {
        let path: KeyPath = self.key.parse().map_err(|e: Error| self.invalid(e.to_string()))?;
        if path.is_root() {
            return Err(self.invalid("empty key".to_string()));
        }
        Ok(path)
    }

    fn invalid(&self, message: String) -> Error {
        Error::InvalidOverride {
            spec: self.spec.clone(),
            message,
        }
    }

    /// Apply this override to `tree` as a value override.
    pub fn apply(&self, tree: &mut ConfigNode) -> Result<()> {
        let path = self.path()?;
        let existing = tree.get_path(&path);

        match self.action {
            OverrideAction::Set | OverrideAction::Add | OverrideAction::ForceAdd => {
                match (self.action, existing) {
                    (OverrideAction::Set, None) => {
                        return Err(self.invalid(format!(
                            "key `{path}` is not in the config; use `+{}` to add it",
                            self.spec
                        )));
                    }
                    (OverrideAction::Add, Some(_)) => {
                        return Err(self.invalid(format!(
                            "key `{path}` already exists; use `++` to replace it"
                        )));
                    }
                    _ => {}
                }
                let value = self.value.clone().unwrap_or(Value::Null);
                tree.set_path(&path, value).map_err(|e| self.invalid(e.to_string()))?;
            }
            OverrideAction::Delete => {
                match (existing, &self.value) {
                    (None, _) => {
                        return Err(self.invalid(format!("key `{path}` is not in the config")));
                    }
                    (Some(current), Some(expected)) if current != expected => {
                        return Err(self.invalid(format!(
                            "key `{path}` does not hold the given value"
                        )));
                    }
                    _ => {}
                }
                tree.remove_path(&path);
            }
        }

        tracing::debug!(spec = %self.spec, "Applied command-line override");
        Ok(())
    }
}

impl FromStr for CommandLineOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidOverride {
            spec: s.to_string(),
            message: message.to_string(),
        };

        let captures = OVERRIDE_REGEX
            .captures(s.trim())
            .ok_or_else(|| invalid("expected `key=value`, `+key=value`, `++key=value` or `~key`"))?;

        let action = match captures.name("prefix").map(|m| m.as_str()) {
            Some("++") => OverrideAction::ForceAdd,
            Some("+") => OverrideAction::Add,
            Some("~") => OverrideAction::Delete,
            _ => OverrideAction::Set,
        };
        let key = captures
            .name("key")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let value = captures.name("value").map(|m| parse_value(m.as_str()));

        if value.is_none() && action != OverrideAction::Delete {
            return Err(invalid("missing `=value`"));
        }

        Ok(Self {
            action,
            key,
            value,
            spec: s.trim().to_string(),
        })
    }
}

impl fmt::Display for CommandLineOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

/// Parse an override value as a YAML scalar or flow collection, falling
/// back to the raw string. An empty value is the empty string.
pub fn parse_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::String(s)) if s.chars().any(|c| c.is_ascii_digit()) => s
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| s.parse::<f64>().map(Value::Float))
            .unwrap_or(Value::String(s)),
        Ok(value) => value,
        Err(_) => Value::String(raw.to_string()),
    }
}
