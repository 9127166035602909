//! Plain text synchronizer.
//!
//! Diffs are character based. A change is expressed as the removal of the
//! replaced span followed by the insertion of the new span, both addressed
//! as `/<char index>`. Removals carry the removed text so they can be
//! verified against the shadow and relocated in the live document.

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::{checksum_bytes, ClientSynchronizer};
use diffsync_protocol::{Diff, Operation};

/// Synchronizer for `String` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSynchronizer;

impl TextSynchronizer {
    /// Creates a text synchronizer.
    pub fn new() -> Self {
        Self
    }
}

fn parse_index(path: &str) -> SyncResult<usize> {
    path.strip_prefix('/')
        .and_then(|index| index.parse().ok())
        .ok_or_else(|| SyncError::patch(path, "expected a character index like \"/3\""))
}

fn required_value(diff: &Diff) -> SyncResult<Vec<char>> {
    diff.value
        .as_deref()
        .map(|v| v.chars().collect())
        .ok_or_else(|| SyncError::patch(&diff.path, format!("{} requires a value", diff.operation.as_str())))
}

fn matches_at(text: &[char], index: usize, expected: &[char]) -> bool {
    index
        .checked_add(expected.len())
        .and_then(|end| text.get(index..end))
        .is_some_and(|span| span == expected)
}

/// Finds the occurrence of `needle` whose start is closest to `near`.
fn find_nearest(text: &[char], needle: &[char], near: usize) -> Option<usize> {
    if needle.is_empty() || needle.len() > text.len() {
        return None;
    }
    (0..=text.len() - needle.len())
        .filter(|&start| matches_at(text, start, needle))
        .min_by_key(|&start| start.abs_diff(near))
}

impl ClientSynchronizer for TextSynchronizer {
    type Content = String;

    fn diff(&self, old: &String, new: &String) -> Vec<Diff> {
        let old: Vec<char> = old.chars().collect();
        let new: Vec<char> = new.chars().collect();

        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let removed: String = old[prefix..old.len() - suffix].iter().collect();
        let inserted: String = new[prefix..new.len() - suffix].iter().collect();

        let path = format!("/{prefix}");
        let mut diffs = Vec::new();
        if !removed.is_empty() {
            diffs.push(Diff::remove(path.clone(), Some(removed)));
        }
        if !inserted.is_empty() {
            diffs.push(Diff::add(path, inserted));
        }
        diffs
    }

    fn apply(&self, diffs: &[Diff], content: &String) -> SyncResult<String> {
        let mut text: Vec<char> = content.chars().collect();

        for diff in diffs {
            match diff.operation {
                Operation::Add => {
                    let index = parse_index(&diff.path)?;
                    let value = required_value(diff)?;
                    if index > text.len() {
                        return Err(SyncError::patch(
                            &diff.path,
                            format!("index out of bounds (length {})", text.len()),
                        ));
                    }
                    text.splice(index..index, value);
                }
                Operation::Remove => {
                    let index = parse_index(&diff.path)?;
                    let value = required_value(diff)?;
                    if !matches_at(&text, index, &value) {
                        return Err(SyncError::patch(&diff.path, "removed text does not match"));
                    }
                    text.drain(index..index + value.len());
                }
                Operation::Replace if diff.path.is_empty() => {
                    text = required_value(diff)?;
                }
                Operation::Test => {
                    let value = required_value(diff)?;
                    let ok = if diff.path.is_empty() {
                        text == value
                    } else {
                        matches_at(&text, parse_index(&diff.path)?, &value)
                    };
                    if !ok {
                        return Err(SyncError::patch(&diff.path, "test failed"));
                    }
                }
                Operation::Replace => {
                    return Err(SyncError::patch(
                        &diff.path,
                        "replace is only supported on the whole text",
                    ));
                }
            }
        }

        Ok(text.into_iter().collect())
    }

    fn apply_fuzzy(&self, diffs: &[Diff], content: &String) -> String {
        let mut text: Vec<char> = content.chars().collect();
        // Displacement of the live text relative to the diff coordinates.
        let mut offset: isize = 0;

        for diff in diffs {
            let Ok(index) = parse_index(&diff.path) else {
                if diff.operation == Operation::Replace && diff.path.is_empty() {
                    if let Ok(value) = required_value(diff) {
                        text = value;
                        offset = 0;
                    }
                }
                continue;
            };
            let Ok(value) = required_value(diff) else {
                continue;
            };
            let shifted = index.saturating_add_signed(offset).min(text.len());

            match diff.operation {
                Operation::Add => {
                    text.splice(shifted..shifted, value);
                }
                Operation::Remove => {
                    if let Some(found) = find_nearest(&text, &value, shifted) {
                        offset += found as isize - shifted as isize;
                        text.drain(found..found + value.len());
                    } else {
                        tracing::debug!(path = %diff.path, "removed text not found in document");
                    }
                }
                Operation::Replace | Operation::Test => {}
            }
        }

        text.into_iter().collect()
    }

    fn checksum(&self, content: &String) -> String {
        checksum_bytes(content.as_bytes())
    }
}
