//! core-attr: ordered key→string attribute maps.
//!
//! Panes, marks and documents all carry one of these. Entries are kept sorted
//! by `(pos, key)`; unpositioned entries use [`NO_POS`] and therefore sort
//! ahead of every positioned entry. Position-indexed entries exist so text
//! attributes can be trimmed and copied by range.

use smallvec::SmallVec;
use tracing::trace;

/// Position used for entries that are not tied to a document offset.
pub const NO_POS: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrEntry {
    pos: i32,
    key: String,
    val: String,
}

/// A small ordered attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrMap {
    entries: SmallVec<[AttrEntry; 4]>,
}

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of `(pos, key)` if present, else the insertion point.
    fn locate(&self, pos: i32, key: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| (e.pos, e.key.as_str()).cmp(&(pos, key)))
    }

    /// Look up an unpositioned attribute.
    pub fn find(&self, key: &str) -> Option<&str> {
        self.find_pos(NO_POS, key)
    }

    /// Look up an attribute at an explicit position.
    pub fn find_pos(&self, pos: i32, key: &str) -> Option<&str> {
        self.locate(pos, key)
            .ok()
            .map(|i| self.entries[i].val.as_str())
    }

    /// Insert or replace an unpositioned attribute.
    pub fn set(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.set_pos(NO_POS, key, val);
    }

    /// Insert or replace an attribute at an explicit position.
    pub fn set_pos(&mut self, pos: i32, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        let val = val.into();
        trace!(target: "attr", pos, key = key.as_str(), "set");
        match self.locate(pos, &key) {
            Ok(i) => self.entries[i].val = val,
            Err(i) => self.entries.insert(i, AttrEntry { pos, key, val }),
        }
    }

    /// Remove an unpositioned attribute. Returns whether it existed.
    pub fn del(&mut self, key: &str) -> bool {
        self.del_pos(NO_POS, key)
    }

    /// Remove an attribute at an explicit position. Returns whether it existed.
    pub fn del_pos(&mut self, pos: i32, key: &str) -> bool {
        match self.locate(pos, key) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Drop every positioned entry at or after `pos`.
    pub fn truncate(&mut self, pos: i32) {
        self.entries.retain(|e| e.pos == NO_POS || e.pos < pos);
    }

    /// Copy the entries with `lo <= pos < hi` into a new map, positions
    /// rebased so the copy starts at zero.
    pub fn copy_range(&self, lo: i32, hi: i32) -> AttrMap {
        let mut out = AttrMap::new();
        for e in &self.entries {
            if e.pos != NO_POS && e.pos >= lo && e.pos < hi {
                out.entries.push(AttrEntry {
                    pos: e.pos - lo,
                    key: e.key.clone(),
                    val: e.val.clone(),
                });
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate `(pos, key, value)` in `(pos, key)` order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.pos, e.key.as_str(), e.val.as_str()))
    }
}
