//! src/model/selection.rs
//! ============================================================================
//! # Selections, tags, marks and the jump list
//!
//! Plain in-memory sets owned by the navigator. Selections carry a sequence
//! number so multi-file operations see them in the order they were picked,
//! never in map iteration order.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use compact_str::CompactString;
use unicode_width::UnicodeWidthStr;

use crate::error::{AppError, AppResult};

// ------------------------------------------------------------
// Selections
// ------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct Selections {
    entries: HashMap<PathBuf, u64>,
    next_seq: u64,
}

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `path` if unselected, deselect it otherwise.
    pub fn toggle(&mut self, path: &Path) {
        if self.entries.remove(path).is_some() {
            if self.entries.is_empty() {
                self.next_seq = 0;
            }
            return;
        }

        self.entries.insert(path.to_path_buf(), self.next_seq);
        self.next_seq += 1;
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    /// Drop every selection `keep` rejects; the counter restarts once empty.
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.entries.retain(|p: &PathBuf, _: &mut u64| keep(p));
        if self.entries.is_empty() {
            self.next_seq = 0;
        }
    }

    /// Selected paths accepted by `scope`, in selection order.
    pub fn ordered(&self, scope: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
        let mut picked: Vec<(&PathBuf, u64)> = self
            .entries
            .iter()
            .filter(|(p, _)| scope(p))
            .map(|(p, seq)| (p, *seq))
            .collect();
        picked.sort_by_key(|(_, seq)| *seq);

        picked.into_iter().map(|(p, _)| p.clone()).collect()
    }
}

// ------------------------------------------------------------
// Tags
// ------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tags {
    entries: HashMap<PathBuf, CompactString>,
}

impl Tags {
    /// A tag must render in exactly one terminal column.
    pub fn validate(tag: &str) -> AppResult<()> {
        if tag.chars().count() != 1 || UnicodeWidthStr::width(tag) != 1 {
            return Err(AppError::invalid_input(
                "tag",
                "tag should be single width character",
            ));
        }

        Ok(())
    }

    pub fn set(&mut self, path: PathBuf, tag: &str) {
        self.entries.insert(path, CompactString::from(tag));
    }

    /// Remove `tag` from `path` if it is set there, else set it.
    pub fn toggle(&mut self, path: &Path, tag: &str) {
        if self.entries.get(path).is_some_and(|t: &CompactString| t == tag) {
            self.entries.remove(path);
        } else {
            self.entries.insert(path.to_path_buf(), CompactString::from(tag));
        }
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(CompactString::as_str)
    }

    pub fn remove(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by path, as written to the tags file.
    pub fn sorted(&self) -> Vec<(&Path, &str)> {
        let mut out: Vec<(&Path, &str)> = self
            .entries
            .iter()
            .map(|(p, t)| (p.as_path(), t.as_str()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub fn replace(&mut self, entries: HashMap<PathBuf, CompactString>) {
        self.entries = entries;
    }
}

// ------------------------------------------------------------
// Marks
// ------------------------------------------------------------

/// Bookmarks keyed by their mark character; iteration is sorted by key.
pub type Marks = BTreeMap<char, PathBuf>;

// ------------------------------------------------------------
// Jump list
// ------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct JumpList {
    paths: Vec<PathBuf>,
    index: usize,
}

impl JumpList {
    /// Record a visit. Forward history is dropped only when the visit
    /// diverges from it.
    pub fn record(&mut self, path: &Path) {
        let len: usize = self.paths.len();

        if len > 0 && self.index < len - 1 {
            if self.paths[self.index] == path {
                return;
            }
            self.paths.truncate(self.index + 1);
        }

        if self.paths.last().is_none_or(|last: &PathBuf| last != path) {
            self.paths.push(path.to_path_buf());
        }

        self.index = self.paths.len() - 1;
    }

    /// Step back; returns the path to change to.
    pub fn prev(&mut self) -> Option<&Path> {
        if self.index == 0 || self.paths.is_empty() {
            return None;
        }

        self.index -= 1;
        Some(&self.paths[self.index])
    }

    /// Step forward; returns the path to change to.
    pub fn next(&mut self) -> Option<&Path> {
        if self.index + 1 >= self.paths.len() {
            return None;
        }

        self.index += 1;
        Some(&self.paths[self.index])
    }

    pub fn current(&self) -> Option<&Path> {
        self.paths.get(self.index).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
