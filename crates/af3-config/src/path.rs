//! Dotted key paths into a config tree

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// One step of a [`KeyPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a value inside a config tree, e.g. `model.optimizer.lr` or
/// `callbacks.items[0]`.
///
/// The empty path addresses the root node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<PathSegment>,
}

impl KeyPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Build a path from plain keys without parsing them.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: keys
                .into_iter()
                .map(|k| PathSegment::Key(k.into()))
                .collect(),
        }
    }

    /// Path of a config group's subtree: `model/net` lands at `model.net`.
    pub fn for_group(group: &str) -> Self {
        Self::from_keys(group.split('/').filter(|part| !part.is_empty()))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// The containing path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn join(&self, other: &KeyPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl FromStr for KeyPath {
    type Err = Error;

    /// Parse `a.b.c`, `a.list[0]` or `a.list.0`.
    ///
    /// Purely numeric dotted parts stay keys; lookups treat them as indices
    /// when they land on a sequence.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidKeyPath {
            path: s.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        if s.is_empty() {
            return Ok(Self { segments });
        }

        for part in s.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(idx) => (&part[..idx], &part[idx..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(invalid("empty key"));
            }
            if key.contains(']') {
                return Err(invalid("unbalanced `]`"));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            } else if segments.is_empty() {
                return Err(invalid("path cannot start with an index"));
            }

            while !rest.is_empty() {
                let Some(close) = rest.find(']') else {
                    return Err(invalid("unterminated `[`"));
                };
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(invalid("unexpected text after index"));
                }
            }
        }

        Ok(Self { segments })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}
