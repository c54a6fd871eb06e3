//! core-keymap: the string-keyed command registry.
//!
//! A [`Keymap`] holds three overlapping indexes — exact keys, non-overlapping
//! half-open key ranges, and prefixes. Lookup is deterministic: an exact match
//! beats the longest matching prefix, which beats the containing range.
//! Several maps can be chained through [`KeymapChain`]; the chain is searched
//! in insertion order and the first hit wins.
//!
//! The map is generic over its handler payload so it can be exercised without
//! dragging in the dispatch machinery; the editor instantiates it with
//! refcounted command values.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use core_cmd::CmdError;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
struct RangeEntry<H> {
    lo: String,
    hi: String,
    handler: H,
}

/// One registry: exact + range + prefix indexes over string keys.
#[derive(Debug, Clone)]
pub struct Keymap<H> {
    exact: HashMap<String, H>,
    prefixes: Vec<(String, H)>,
    /// Sorted by `lo`; intervals are pairwise disjoint.
    ranges: Vec<RangeEntry<H>>,
}

impl<H> Default for Keymap<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Keymap<H> {
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            ranges: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len() + self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register an exact key. A later insert at the same key replaces.
    pub fn add(&mut self, key: impl Into<String>, handler: H) {
        let key = key.into();
        if self.exact.insert(key.clone(), handler).is_some() {
            debug!(target: "keymap", key = key.as_str(), "exact_replaced");
        }
    }

    /// Register a prefix key. A later insert at the same prefix replaces.
    pub fn add_prefix(&mut self, prefix: impl Into<String>, handler: H) {
        let prefix = prefix.into();
        if let Some(slot) = self.prefixes.iter_mut().find(|(p, _)| *p == prefix) {
            debug!(target: "keymap", prefix = prefix.as_str(), "prefix_replaced");
            slot.1 = handler;
        } else {
            self.prefixes.push((prefix, handler));
        }
    }

    /// Register a half-open range `[lo, hi)`. Overlapping an existing range
    /// fails with `Econflict`; an empty or inverted range is `Enoarg`.
    pub fn add_range(
        &mut self,
        lo: impl Into<String>,
        hi: impl Into<String>,
        handler: H,
    ) -> Result<(), CmdError> {
        let lo = lo.into();
        let hi = hi.into();
        if lo >= hi {
            return Err(CmdError::Enoarg);
        }
        let at = self.ranges.partition_point(|r| r.lo < lo);
        // Disjointness: the predecessor must end at or before `lo`, the
        // successor must start at or after `hi`.
        if at > 0 && self.ranges[at - 1].hi > lo {
            warn!(target: "keymap", lo = lo.as_str(), hi = hi.as_str(), "range_conflict");
            return Err(CmdError::Econflict);
        }
        if at < self.ranges.len() && self.ranges[at].lo < hi {
            warn!(target: "keymap", lo = lo.as_str(), hi = hi.as_str(), "range_conflict");
            return Err(CmdError::Econflict);
        }
        self.ranges.insert(at, RangeEntry { lo, hi, handler });
        Ok(())
    }

    /// Resolve `key`: exact, else longest matching prefix, else containing
    /// range.
    pub fn lookup(&self, key: &str) -> Option<&H> {
        if let Some(h) = self.exact.get(key) {
            trace!(target: "keymap", key, kind = "exact", "hit");
            return Some(h);
        }
        if let Some((p, h)) = self
            .prefixes
            .iter()
            .filter(|(p, _)| key.starts_with(p.as_str()))
            .max_by_key(|(p, _)| p.len())
        {
            trace!(target: "keymap", key, prefix = p.as_str(), kind = "prefix", "hit");
            return Some(h);
        }
        let at = self.ranges.partition_point(|r| r.lo.as_str() <= key);
        if at > 0 {
            let r = &self.ranges[at - 1];
            if key < r.hi.as_str() {
                trace!(target: "keymap", key, lo = r.lo.as_str(), kind = "range", "hit");
                return Some(&r.handler);
            }
        }
        None
    }
}

/// A shareable registry link; one global map can back several editor roots.
pub type SharedKeymap<H> = Rc<RefCell<Keymap<H>>>;

/// Convenience constructor for a [`SharedKeymap`].
pub fn shared<H>() -> SharedKeymap<H> {
    Rc::new(RefCell::new(Keymap::new()))
}

/// An ordered chain of shared registries, searched front to back.
#[derive(Debug, Clone)]
pub struct KeymapChain<H> {
    links: SmallVec<[SharedKeymap<H>; 2]>,
}

impl<H> Default for KeymapChain<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> KeymapChain<H> {
    pub fn new() -> Self {
        Self {
            links: SmallVec::new(),
        }
    }

    pub fn push(&mut self, link: SharedKeymap<H>) {
        self.links.push(link);
    }

    pub fn links(&self) -> usize {
        self.links.len()
    }
}

impl<H: Clone> KeymapChain<H> {
    /// First hit across the chain, cloned out so no registry borrow outlives
    /// the lookup.
    pub fn lookup(&self, key: &str) -> Option<H> {
        for link in &self.links {
            if let Some(h) = link.borrow().lookup(key) {
                return Some(h.clone());
            }
        }
        None
    }
}
