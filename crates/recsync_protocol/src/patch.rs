//! Structural get/set/merge over immutable JSON trees.
//!
//! All operations return new roots and never mutate their inputs. When an
//! operation changes nothing it returns the original value (same
//! allocation), so callers detect change with [`Value::same`]. Work is
//! proportional to the changed part of the tree; unchanged subtrees are
//! settled by the identity check at each level.

use crate::error::{ProtocolError, ProtocolResult};
use crate::path::{as_index, tokenize};
use recsync_codec::{Entries, Value};
use std::sync::Arc;

/// Largest array index `set` will materialize.
pub const MAX_INDEX: usize = 1 << 20;

/// Reads the value at `path`.
///
/// An absent or empty path returns the root. Returns `None` when any
/// intermediate node is missing or is not a container, and for paths that
/// do not tokenize.
pub fn get(root: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return Some(root.clone());
    };
    let segments = tokenize(path).ok()?;
    let mut node = root;
    for segment in segments.iter() {
        node = match node {
            Value::Object(_) => node.get_key(segment)?,
            Value::Array(_) => node.get_index(as_index(segment)?)?,
            _ => return None,
        };
    }
    Some(node.clone())
}

/// Returns `root` with `value` written at `path`.
///
/// An absent or empty path merges `value` into the whole root. Otherwise
/// only the nodes along the path are copied; missing intermediates become
/// arrays when the following segment is numeric and objects otherwise.
/// Returns `root` itself when the write changes nothing.
///
/// # Errors
///
/// Fails on an untokenizable path, an index above [`MAX_INDEX`], or a
/// value that is not JSON-compatible.
pub fn set(root: &Value, path: Option<&str>, value: &Value) -> ProtocolResult<Value> {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return merge(root, value);
    };
    let segments = tokenize(path)?;
    if let Some(big) = segments
        .iter()
        .filter_map(|s| as_index(s))
        .find(|i| *i > MAX_INDEX)
    {
        return Err(ProtocolError::invalid_path(
            path,
            format!("index {big} exceeds {MAX_INDEX}"),
        ));
    }
    set_in(Some(root), &segments, value)
}

fn set_in(node: Option<&Value>, segments: &[String], value: &Value) -> ProtocolResult<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return match node {
            Some(old) => merge(old, value),
            None => validated(value),
        };
    };

    let Some(current) = node else {
        return materialize(head, rest, value);
    };
    match (current, as_index(head)) {
        (Value::Object(entries), _) => {
            let pos = entries.iter().position(|(k, _)| **k == **head);
            let child = pos.map(|i| &entries[i].1);
            let updated = set_in(child, rest, value)?;
            if child.is_some_and(|c| c.same(&updated)) {
                return Ok(current.clone());
            }
            let mut copy: Entries = entries.to_vec();
            match pos {
                Some(i) => copy[i].1 = updated,
                None => copy.push((Arc::from(head.as_str()), updated)),
            }
            Ok(Value::Object(Arc::new(copy)))
        }
        (Value::Array(items), Some(index)) => {
            let child = items.get(index);
            let updated = set_in(child, rest, value)?;
            if child.is_some_and(|c| c.same(&updated)) {
                return Ok(current.clone());
            }
            let mut copy = items.to_vec();
            if index < copy.len() {
                copy[index] = updated;
            } else {
                copy.resize(index, Value::Null);
                copy.push(updated);
            }
            Ok(Value::Array(Arc::new(copy)))
        }
        _ => materialize(head, rest, value),
    }
}

fn materialize(head: &str, rest: &[String], value: &Value) -> ProtocolResult<Value> {
    let updated = set_in(None, rest, value)?;
    Ok(match as_index(head) {
        Some(index) => {
            let mut items = vec![Value::Null; index];
            items.push(updated);
            Value::array(items)
        }
        None => Value::Object(Arc::new(vec![(Arc::from(head), updated)])),
    })
}

/// Merges `new` over `old`, sharing every unchanged subtree of `old`.
///
/// - identical values return `old`
/// - `null` on either side replaces wholesale
/// - arrays merge element-wise; the unchanged prefix is shared
/// - objects merge per key and take the key order of `new`
/// - anything else replaces wholesale
///
/// If the result is structurally equal to `old`, `old` itself is returned.
///
/// # Errors
///
/// Fails if the parts of `new` that are taken over are not JSON-compatible.
pub fn merge(old: &Value, new: &Value) -> ProtocolResult<Value> {
    if old.same(new) {
        return Ok(old.clone());
    }

    match (old, new) {
        (Value::Array(a), Value::Array(b)) => {
            let mut out: Option<Vec<Value>> = None;
            for (i, next) in b.iter().enumerate() {
                let merged = match a.get(i) {
                    Some(prev) => merge(prev, next)?,
                    None => validated(next)?,
                };
                if out.is_none() && !a.get(i).is_some_and(|prev| prev.same(&merged)) {
                    out = Some(a[..i].to_vec());
                }
                if let Some(out) = out.as_mut() {
                    out.push(merged);
                }
            }
            Ok(match out {
                Some(out) => Value::Array(Arc::new(out)),
                None if a.len() == b.len() => old.clone(),
                None => Value::Array(Arc::new(a[..b.len()].to_vec())),
            })
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut out: Option<Entries> = None;
            for (i, (key, next)) in b.iter().enumerate() {
                let in_place = a.get(i).filter(|(k, _)| k == key);
                let prev = in_place
                    .or_else(|| a.iter().find(|(k, _)| k == key))
                    .map(|(_, v)| v);
                let merged = match prev {
                    Some(prev) => merge(prev, next)?,
                    None => validated(next)?,
                };
                if out.is_none() && !in_place.is_some_and(|(_, v)| v.same(&merged)) {
                    out = Some(a[..i].to_vec());
                }
                if let Some(out) = out.as_mut() {
                    out.push((Arc::clone(key), merged));
                }
            }
            Ok(match out {
                Some(out) => Value::Object(Arc::new(out)),
                None if a.len() == b.len() => old.clone(),
                None => Value::Object(Arc::new(a[..b.len()].to_vec())),
            })
        }
        _ => validated(new),
    }
}

fn validated(value: &Value) -> ProtocolResult<Value> {
    value.validate()?;
    Ok(value.clone())
}
