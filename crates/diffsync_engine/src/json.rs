//! JSON tree synchronizer.
//!
//! Diffs are RFC 6902 style operations addressed by RFC 6901 JSON Pointers.
//! Operand values travel as JSON-encoded strings. The checksum covers the
//! compact encoding with object keys in sorted order, so it does not depend
//! on map iteration order.

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::{checksum_bytes, ClientSynchronizer};
use diffsync_protocol::{Diff, Operation};
use serde_json::Value;

/// Synchronizer for `serde_json::Value` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSynchronizer;

impl JsonSynchronizer {
    /// Creates a JSON synchronizer.
    pub fn new() -> Self {
        Self
    }
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn child_path(parent: &str, token: &str) -> String {
    format!("{parent}/{}", escape_token(token))
}

/// Splits a pointer into its parent pointer and unescaped last token.
fn split_last(path: &str) -> SyncResult<(&str, String)> {
    let at = path
        .rfind('/')
        .ok_or_else(|| SyncError::patch(path, "not a JSON pointer"))?;
    let token = path[at + 1..].replace("~1", "/").replace("~0", "~");
    Ok((&path[..at], token))
}

fn encode(value: &Value) -> String {
    value.to_string()
}

fn decode(diff: &Diff) -> SyncResult<Value> {
    let raw = diff
        .value
        .as_deref()
        .ok_or_else(|| SyncError::patch(&diff.path, format!("{} requires a value", diff.operation.as_str())))?;
    serde_json::from_str(raw)
        .map_err(|e| SyncError::patch(&diff.path, format!("invalid JSON operand: {e}")))
}

fn diff_values(path: &str, old: &Value, new: &Value, out: &mut Vec<Diff>) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for key in a.keys().filter(|k| !b.contains_key(*k)) {
                out.push(Diff::remove(child_path(path, key), None));
            }
            for (key, new_child) in b {
                match a.get(key) {
                    Some(old_child) => diff_values(&child_path(path, key), old_child, new_child, out),
                    None => out.push(Diff::add(child_path(path, key), encode(new_child))),
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for i in 0..common {
                diff_values(&format!("{path}/{i}"), &a[i], &b[i], out);
            }
            for i in (common..a.len()).rev() {
                out.push(Diff::remove(format!("{path}/{i}"), None));
            }
            for (i, item) in b.iter().enumerate().skip(common) {
                out.push(Diff::add(format!("{path}/{i}"), encode(item)));
            }
        }
        _ => out.push(Diff::replace(path, encode(new))),
    }
}

fn parent_mut<'a>(doc: &'a mut Value, pointer: &str, path: &str) -> SyncResult<&'a mut Value> {
    doc.pointer_mut(pointer)
        .ok_or_else(|| SyncError::patch(path, "parent does not exist"))
}

fn parse_array_index(token: &str, path: &str) -> SyncResult<usize> {
    token
        .parse()
        .map_err(|_| SyncError::patch(path, "invalid array index"))
}

fn apply_add(doc: &mut Value, path: &str, value: Value) -> SyncResult<()> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    let (parent, token) = split_last(path)?;
    match parent_mut(doc, parent, path)? {
        Value::Object(map) => {
            map.insert(token, value);
        }
        Value::Array(items) if token == "-" => items.push(value),
        Value::Array(items) => {
            let index = parse_array_index(&token, path)?;
            if index > items.len() {
                return Err(SyncError::patch(path, "array index out of bounds"));
            }
            items.insert(index, value);
        }
        _ => return Err(SyncError::patch(path, "parent is not a container")),
    }
    Ok(())
}

fn apply_remove(doc: &mut Value, path: &str) -> SyncResult<()> {
    if path.is_empty() {
        return Err(SyncError::patch(path, "cannot remove the root"));
    }
    let (parent, token) = split_last(path)?;
    match parent_mut(doc, parent, path)? {
        Value::Object(map) => {
            map.remove(&token)
                .ok_or_else(|| SyncError::patch(path, "no such member"))?;
        }
        Value::Array(items) => {
            let index = parse_array_index(&token, path)?;
            if index >= items.len() {
                return Err(SyncError::patch(path, "array index out of bounds"));
            }
            items.remove(index);
        }
        _ => return Err(SyncError::patch(path, "parent is not a container")),
    }
    Ok(())
}

fn apply_replace(doc: &mut Value, path: &str, value: Value) -> SyncResult<()> {
    let target = doc
        .pointer_mut(path)
        .ok_or_else(|| SyncError::patch(path, "target does not exist"))?;
    *target = value;
    Ok(())
}

fn apply_diff(doc: &mut Value, diff: &Diff) -> SyncResult<()> {
    match diff.operation {
        Operation::Add => apply_add(doc, &diff.path, decode(diff)?),
        Operation::Remove => apply_remove(doc, &diff.path),
        Operation::Replace => apply_replace(doc, &diff.path, decode(diff)?),
        Operation::Test => {
            let expected = decode(diff)?;
            match doc.pointer(&diff.path) {
                Some(actual) if *actual == expected => Ok(()),
                _ => Err(SyncError::patch(&diff.path, "test failed")),
            }
        }
    }
}

/// Writes `value` compactly with object keys sorted.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl ClientSynchronizer for JsonSynchronizer {
    type Content = Value;

    fn diff(&self, old: &Value, new: &Value) -> Vec<Diff> {
        let mut diffs = Vec::new();
        diff_values("", old, new, &mut diffs);
        diffs
    }

    fn apply(&self, diffs: &[Diff], content: &Value) -> SyncResult<Value> {
        let mut doc = content.clone();
        for diff in diffs {
            apply_diff(&mut doc, diff)?;
        }
        Ok(doc)
    }

    fn apply_fuzzy(&self, diffs: &[Diff], content: &Value) -> Value {
        let mut doc = content.clone();
        for diff in diffs.iter().filter(|d| d.operation != Operation::Test) {
            if let Err(e) = apply_diff(&mut doc, diff) {
                tracing::debug!(error = %e, "skipping diff that no longer fits");
            }
        }
        doc
    }

    fn checksum(&self, content: &Value) -> String {
        let mut canonical = String::new();
        write_canonical(content, &mut canonical);
        checksum_bytes(canonical.as_bytes())
    }
}
