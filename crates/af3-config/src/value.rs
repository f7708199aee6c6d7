//! Config tree values
//!
//! A [`ConfigNode`] is an ordered mapping from keys to [`Value`]s. Any
//! YAML, TOML or JSON document deserializes into it directly, so the
//! registry loader never goes through an intermediate format-specific tree.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;

use crate::path::{KeyPath, PathSegment};
use crate::{Error, Result};

/// Key under which a [`CallableRef`] is serialized. A mapping holding only
/// this key with a string value deserializes back into a callable.
pub const CALLABLE_KEY: &str = "_callable_";

/// A value stored in a config tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Node(ConfigNode),
    /// Deferred reference to an importable callable, produced by
    /// `${resolve_variable:...}`. Never invoked during composition.
    Callable(CallableRef),
}

/// Opaque handle to a callable named by its dotted import path.
///
/// The run driver looks the path up and calls it, passing the sibling keys
/// of the slot holding the handle as keyword arguments
/// (see [`ConfigNode::call_arguments`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallableRef {
    path: String,
}

impl CallableRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<callable {}>", self.path)
    }
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Node(_) => "node",
            Value::Callable(_) => "callable",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&ConfigNode> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut ConfigNode> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&CallableRef> {
        match self {
            Value::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    /// Step one segment down. Keys that parse as integers index sequences and
    /// indices address integer-like keys, so `a.0` and `a[0]` behave alike.
    pub fn get_segment(&self, segment: &PathSegment) -> Option<&Value> {
        match (self, segment) {
            (Value::Node(node), PathSegment::Key(key)) => node.get(key),
            (Value::Node(node), PathSegment::Index(index)) => node.get(&index.to_string()),
            (Value::Sequence(items), PathSegment::Index(index)) => items.get(*index),
            (Value::Sequence(items), PathSegment::Key(key)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        }
    }

    fn get_segment_mut(&mut self, segment: &PathSegment) -> Option<&mut Value> {
        match (self, segment) {
            (Value::Node(node), PathSegment::Key(key)) => node.get_mut(key),
            (Value::Node(node), PathSegment::Index(index)) => node.get_mut(&index.to_string()),
            (Value::Sequence(items), PathSegment::Index(index)) => items.get_mut(*index),
            (Value::Sequence(items), PathSegment::Key(key)) => {
                key.parse::<usize>().ok().and_then(|i| items.get_mut(i))
            }
            _ => None,
        }
    }

    /// Follow `segments` from this value.
    pub fn descend(&self, segments: &[PathSegment]) -> Option<&Value> {
        segments
            .iter()
            .try_fold(self, |current, segment| current.get_segment(segment))
    }

    /// Render a scalar the way it appears when embedded in a string.
    ///
    /// Returns `None` for nodes, sequences and callables, which have no
    /// textual form inside a larger string.
    pub fn render_scalar(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 => {
                Some(format!("{f:.1}"))
            }
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Sequence(_) | Value::Node(_) | Value::Callable(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ConfigNode> for Value {
    fn from(value: ConfigNode) -> Self {
        Value::Node(value)
    }
}

impl From<CallableRef> for Value {
    fn from(value: CallableRef) -> Self {
        Value::Callable(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Sequence(value.into_iter().map(Into::into).collect())
    }
}

/// Ordered mapping from unique keys to values.
///
/// Insertion order is kept for display and serialization; equality ignores
/// it. Replacing an existing key keeps the key's original position.
#[derive(Debug, Clone, Default)]
pub struct ConfigNode {
    entries: Vec<(String, Value)>,
}

impl ConfigNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up a value by path. The root path is not a value and yields `None`.
    pub fn get_path(&self, path: &KeyPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        let head = match first {
            PathSegment::Key(key) => self.get(key)?,
            PathSegment::Index(index) => self.get(&index.to_string())?,
        };
        head.descend(rest)
    }

    pub fn get_path_mut(&mut self, path: &KeyPath) -> Option<&mut Value> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = match first {
            PathSegment::Key(key) => self.get_mut(key)?,
            PathSegment::Index(index) => self.get_mut(&index.to_string())?,
        };
        for segment in rest {
            current = current.get_segment_mut(segment)?;
        }
        Some(current)
    }

    /// Set the value at `path`, creating missing intermediate nodes.
    ///
    /// Fails with [`Error::MergeConflict`] when an intermediate value exists
    /// but is not a node, and with [`Error::InvalidKeyPath`] for the root path
    /// or an out-of-range sequence index.
    pub fn set_path(&mut self, path: &KeyPath, value: impl Into<Value>) -> Result<Option<Value>> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(Error::InvalidKeyPath {
                path: path.to_string(),
                message: "cannot replace the root node".to_string(),
            });
        };

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            let key = segment_key(segment);
            if !current.contains_key(&key) {
                current.insert(key.clone(), ConfigNode::new());
            }
            current = match current.get_mut(&key) {
                Some(Value::Node(node)) => node,
                Some(other) => {
                    return Err(Error::MergeConflict {
                        path: KeyPath::from_segments(path.segments()[..=depth].to_vec()),
                        existing: other.kind(),
                        incoming: "node",
                    });
                }
                None => {
                    return Err(Error::InvalidKeyPath {
                        path: path.to_string(),
                        message: format!("missing intermediate key `{key}`"),
                    });
                }
            };
        }

        Ok(current.insert(segment_key(last), value))
    }

    /// Remove and return the value at `path`.
    pub fn remove_path(&mut self, path: &KeyPath) -> Option<Value> {
        let (last, parents) = path.segments().split_last()?;
        let container = if parents.is_empty() {
            self
        } else {
            self.get_path_mut(&KeyPath::from_segments(parents.to_vec()))?
                .as_node_mut()?
        };
        container.remove(&segment_key(last))
    }

    /// Keyword arguments for the callable stored under `key`: every sibling
    /// entry except `key` itself.
    pub fn call_arguments(&self, key: &str) -> ConfigNode {
        self.entries
            .iter()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect()
    }
}

fn segment_key(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Key(key) => key.clone(),
        PathSegment::Index(index) => index.to_string(),
    }
}

impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ConfigNode {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut node = ConfigNode::new();
        for (key, value) in iter {
            node.insert(key, value);
        }
        node
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Node(node) => node.serialize(serializer),
            Value::Callable(callable) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(CALLABLE_KEY, callable.path())?;
                map.end()
            }
        }
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a config value")
    }

    fn visit_bool<E>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Integer))
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
        Value::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut node = ConfigNode::new();
        while let Some(key) = map.next_key::<Value>()? {
            let key = match key {
                Value::Sequence(_) | Value::Node(_) | Value::Callable(_) => {
                    return Err(de::Error::custom(format!(
                        "config keys must be scalars, found a {}",
                        key.kind()
                    )));
                }
                scalar => scalar.render_scalar().unwrap_or_default(),
            };
            let value: Value = map.next_value()?;
            node.insert(key, value);
        }
        if let (1, Some(Value::String(path))) = (node.len(), node.get(CALLABLE_KEY)) {
            return Ok(Value::Callable(CallableRef::new(path.clone())));
        }
        Ok(Value::Node(node))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        d.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for ConfigNode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Node(node) => Ok(node),
            Value::Null => Ok(ConfigNode::new()),
            other => Err(de::Error::custom(format!(
                "expected a mapping, found a {}",
                other.kind()
            ))),
        }
    }
}
