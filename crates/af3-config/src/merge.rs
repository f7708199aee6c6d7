//! Deep merge of config trees
//!
//! Nodes merge recursively with the incoming side winning; scalars and
//! sequences are replaced wholesale. Kinds that cannot stand in for each
//! other (a node against a scalar, a sequence against a scalar) are a
//! [`Error::MergeConflict`] rather than a silent coercion. `null` and
//! strings holding a placeholder are wildcards: their real kind is unknown
//! until resolution.

use crate::path::KeyPath;
use crate::resolver::contains_placeholder;
use crate::value::{ConfigNode, Value};
use crate::{Error, Result};

/// Merge `overlay` into `base` in place.
///
/// On error `base` may be partially merged; callers compose into a scratch
/// tree and drop it on failure.
pub fn merge_nodes(base: &mut ConfigNode, overlay: &ConfigNode) -> Result<()> {
    merge_node_at(base, overlay, &KeyPath::root())
}

/// Merge `overlay` into the subtree of `base` at `at`, creating the subtree
/// if it does not exist yet.
pub fn merge_at(base: &mut ConfigNode, at: &KeyPath, overlay: &ConfigNode) -> Result<()> {
    if at.is_root() {
        return merge_nodes(base, overlay);
    }
    match base.get_path_mut(at) {
        Some(Value::Node(existing)) => merge_node_at(existing, overlay, at),
        Some(existing) if accepts(existing, &Value::Node(ConfigNode::new())) => {
            *existing = Value::Node(overlay.clone());
            Ok(())
        }
        Some(existing) => Err(Error::MergeConflict {
            path: at.clone(),
            existing: existing.kind(),
            incoming: "node",
        }),
        None => base.set_path(at, overlay.clone()).map(|_| ()),
    }
}

fn merge_node_at(base: &mut ConfigNode, overlay: &ConfigNode, at: &KeyPath) -> Result<()> {
    for (key, incoming) in overlay.iter() {
        let path = at.child(key);
        match base.get_mut(key) {
            Some(existing) => merge_value_at(existing, incoming, &path)?,
            None => {
                base.insert(key, incoming.clone());
            }
        }
    }
    Ok(())
}

fn merge_value_at(existing: &mut Value, incoming: &Value, path: &KeyPath) -> Result<()> {
    if let (Value::Node(base), Value::Node(overlay)) = (&mut *existing, incoming) {
        return merge_node_at(base, overlay, path);
    }
    if !accepts(existing, incoming) {
        return Err(Error::MergeConflict {
            path: path.clone(),
            existing: existing.kind(),
            incoming: incoming.kind(),
        });
    }
    *existing = incoming.clone();
    Ok(())
}

#[derive(PartialEq)]
enum Shape {
    Node,
    Sequence,
    Scalar,
}

fn shape(value: &Value) -> Shape {
    match value {
        Value::Node(_) => Shape::Node,
        Value::Sequence(_) => Shape::Sequence,
        _ => Shape::Scalar,
    }
}

fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => contains_placeholder(s),
        _ => false,
    }
}

/// Whether `incoming` may replace `existing`.
fn accepts(existing: &Value, incoming: &Value) -> bool {
    is_wildcard(existing) || is_wildcard(incoming) || shape(existing) == shape(incoming)
}
