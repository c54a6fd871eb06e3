//! core-mark: ordered positional references into a document.
//!
//! A [`MarkSet`] is owned by a document and keeps every mark of that document
//! in one totally ordered chain. Ordering is carried by a `seq` number so two
//! marks compare in O(1); the chain itself stays sorted. `seq` values are
//! assigned with gaps and a local span is renumbered when a gap runs out.
//!
//! The `ref` payload is opaque to the kernel: the owning document decides what
//! a position means. Mark identifiers are generational, so a stale [`MarkId`]
//! held across a release is inert rather than dangling.

use std::cmp::Ordering;

use core_cmd::CmdError;
use tracing::{debug, trace};

/// Spacing between freshly appended `seq` values.
const SEQ_STEP: u32 = 256;

/// Generational mark identifier: slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkId(pub u32, pub u32);

impl MarkId {
    pub fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub fn idx(self) -> usize {
        self.0 as usize
    }

    pub fn generation(self) -> u32 {
        self.1
    }
}

#[derive(Debug, Clone)]
struct MarkSlot<R> {
    generation: u32,
    payload: R,
    seq: u32,
    view: Option<u32>,
}

/// The ordered mark chain of one document.
#[derive(Debug, Clone)]
pub struct MarkSet<R> {
    slots: Vec<Option<MarkSlot<R>>>,
    generations: Vec<u32>,
    free: Vec<usize>,
    /// Chain in ascending `seq` order.
    chain: Vec<MarkId>,
}

impl<R> Default for MarkSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> MarkSet<R> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            chain: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn is_alive(&self, m: MarkId) -> bool {
        self.slots
            .get(m.idx())
            .and_then(|s| s.as_ref())
            .map(|s| s.generation == m.1)
            .unwrap_or(false)
    }

    fn slot(&self, m: MarkId) -> Option<&MarkSlot<R>> {
        let s = self.slots.get(m.idx())?.as_ref()?;
        (s.generation == m.1).then_some(s)
    }

    fn slot_mut(&mut self, m: MarkId) -> Option<&mut MarkSlot<R>> {
        let s = self.slots.get_mut(m.idx())?.as_mut()?;
        (s.generation == m.1).then_some(s)
    }

    fn chain_index(&self, m: MarkId) -> Option<usize> {
        let seq = self.slot(m)?.seq;
        let at = self.chain.partition_point(|c| {
            self.slots[c.idx()].as_ref().expect("chained mark alive").seq < seq
        });
        // Seqs are unique, so the partition point names the mark itself.
        (self.chain.get(at) == Some(&m)).then_some(at)
    }

    fn alloc_slot(&mut self, payload: R, seq: u32) -> MarkId {
        let slot = MarkSlot {
            generation: 0,
            payload,
            seq,
            view: None,
        };
        if let Some(idx) = self.free.pop() {
            let generation = self.generations[idx].wrapping_add(1);
            self.generations[idx] = generation;
            self.slots[idx] = Some(MarkSlot { generation, ..slot });
            MarkId::new(idx as u32, generation)
        } else {
            let generation = 1;
            self.generations.push(generation);
            self.slots.push(Some(MarkSlot { generation, ..slot }));
            MarkId::new((self.slots.len() - 1) as u32, generation)
        }
    }

    /// Seq for inserting at chain position `at`, renumbering a local span if
    /// the neighboring gap is exhausted.
    fn seq_for_insert(&mut self, at: usize) -> u32 {
        loop {
            let lo = if at == 0 {
                0
            } else {
                self.seq_at(at - 1)
            };
            let hi = if at >= self.chain.len() {
                // Appending: step past the tail, renumber on overflow.
                match lo.checked_add(SEQ_STEP) {
                    Some(s) => return s,
                    None => {
                        self.renumber(0, self.chain.len());
                        continue;
                    }
                }
            } else {
                self.seq_at(at)
            };
            if hi - lo >= 2 {
                return lo + (hi - lo) / 2;
            }
            self.renumber_around(at);
        }
    }

    fn seq_at(&self, chain_idx: usize) -> u32 {
        let m = self.chain[chain_idx];
        self.slots[m.idx()].as_ref().expect("chained mark alive").seq
    }

    /// Renumber a window around `at`, doubling until enough slack exists.
    fn renumber_around(&mut self, at: usize) {
        let mut radius = 8usize;
        loop {
            let lo = at.saturating_sub(radius);
            let hi = (at + radius).min(self.chain.len());
            let floor = if lo == 0 { 0 } else { self.seq_at(lo - 1) };
            let ceil = if hi == self.chain.len() {
                u32::MAX
            } else {
                self.seq_at(hi)
            };
            let need = (hi - lo) as u32 + 2;
            if ceil - floor > need * 2 {
                self.renumber_span(lo, hi, floor, ceil);
                return;
            }
            if lo == 0 && hi == self.chain.len() {
                self.renumber(0, self.chain.len());
                return;
            }
            radius *= 2;
        }
    }

    fn renumber_span(&mut self, lo: usize, hi: usize, floor: u32, ceil: u32) {
        let count = (hi - lo) as u32;
        if count == 0 {
            return;
        }
        let gap = (ceil - floor) / (count + 1);
        debug!(target: "mark", lo, hi, gap, "renumber_span");
        for (i, idx) in (lo..hi).enumerate() {
            let m = self.chain[idx];
            let seq = floor + gap * (i as u32 + 1);
            self.slots[m.idx()].as_mut().expect("chained mark alive").seq = seq;
        }
    }

    /// Renumber the whole span `[lo, hi)` with fresh SEQ_STEP spacing.
    fn renumber(&mut self, lo: usize, hi: usize) {
        debug!(target: "mark", count = hi - lo, "renumber_full");
        for (i, idx) in (lo..hi).enumerate() {
            let m = self.chain[idx];
            self.slots[m.idx()].as_mut().expect("chained mark alive").seq =
                (i as u32 + 1) * SEQ_STEP;
        }
    }

    /// Allocate a mark at the front of the chain.
    pub fn alloc_at_start(&mut self, payload: R) -> MarkId {
        let seq = self.seq_for_insert(0);
        let m = self.alloc_slot(payload, seq);
        self.chain.insert(0, m);
        trace!(target: "mark", idx = m.0, seq, "alloc_start");
        m
    }

    /// Allocate a mark at the back of the chain.
    pub fn alloc_at_end(&mut self, payload: R) -> MarkId {
        let at = self.chain.len();
        let seq = self.seq_for_insert(at);
        let m = self.alloc_slot(payload, seq);
        self.chain.push(m);
        trace!(target: "mark", idx = m.0, seq, "alloc_end");
        m
    }

    /// Allocate a mark immediately after an existing one.
    pub fn alloc_after(&mut self, after: MarkId, payload: R) -> Result<MarkId, CmdError> {
        let at = self.chain_index(after).ok_or(CmdError::Efail)? + 1;
        let seq = self.seq_for_insert(at);
        let m = self.alloc_slot(payload, seq);
        self.chain.insert(at, m);
        trace!(target: "mark", idx = m.0, seq, "alloc_after");
        Ok(m)
    }

    /// Release a mark. Stale ids are a no-op; returns whether it was alive.
    pub fn release(&mut self, m: MarkId) -> bool {
        let Some(at) = self.chain_index(m) else {
            return false;
        };
        self.chain.remove(at);
        self.slots[m.idx()] = None;
        self.free.push(m.idx());
        trace!(target: "mark", idx = m.0, "release");
        true
    }

    /// Re-link a mark so it sits immediately after `after` (or at the front
    /// for `None`). The payload is untouched; only ordering changes.
    pub fn move_after(&mut self, m: MarkId, after: Option<MarkId>) -> Result<(), CmdError> {
        let from = self.chain_index(m).ok_or(CmdError::Efail)?;
        self.chain.remove(from);
        let at = match after {
            None => 0,
            Some(a) => match self.chain_index(a) {
                Some(i) => i + 1,
                None => {
                    self.chain.insert(from, m);
                    return Err(CmdError::Efail);
                }
            },
        };
        let seq = self.seq_for_insert(at);
        self.slots[m.idx()].as_mut().expect("alive").seq = seq;
        self.chain.insert(at, m);
        Ok(())
    }

    pub fn move_to_start(&mut self, m: MarkId) -> Result<(), CmdError> {
        self.move_after(m, None)
    }

    pub fn move_to_end(&mut self, m: MarkId) -> Result<(), CmdError> {
        match self.chain.last().copied() {
            Some(last) if last != m => self.move_after(m, Some(last)),
            Some(_) => Ok(()),
            None => Err(CmdError::Efail),
        }
    }

    pub fn first(&self) -> Option<MarkId> {
        self.chain.first().copied()
    }

    pub fn last(&self) -> Option<MarkId> {
        self.chain.last().copied()
    }

    /// Next mark along the chain.
    pub fn next(&self, m: MarkId) -> Option<MarkId> {
        let at = self.chain_index(m)?;
        self.chain.get(at + 1).copied()
    }

    /// Previous mark along the chain.
    pub fn prev(&self, m: MarkId) -> Option<MarkId> {
        let at = self.chain_index(m)?;
        at.checked_sub(1).map(|i| self.chain[i])
    }

    pub fn seq(&self, m: MarkId) -> Option<u32> {
        self.slot(m).map(|s| s.seq)
    }

    /// Positional comparison, `None` when either mark is stale.
    pub fn cmp(&self, a: MarkId, b: MarkId) -> Option<Ordering> {
        Some(self.slot(a)?.seq.cmp(&self.slot(b)?.seq))
    }

    pub fn payload(&self, m: MarkId) -> Option<&R> {
        self.slot(m).map(|s| &s.payload)
    }

    pub fn payload_mut(&mut self, m: MarkId) -> Option<&mut R> {
        self.slot_mut(m).map(|s| &mut s.payload)
    }

    pub fn set_payload(&mut self, m: MarkId, payload: R) -> bool {
        match self.slot_mut(m) {
            Some(s) => {
                s.payload = payload;
                true
            }
            None => false,
        }
    }

    pub fn view(&self, m: MarkId) -> Option<u32> {
        self.slot(m).and_then(|s| s.view)
    }

    pub fn set_view(&mut self, m: MarkId, view: Option<u32>) -> bool {
        match self.slot_mut(m) {
            Some(s) => {
                s.view = view;
                true
            }
            None => false,
        }
    }

    /// Iterate the chain front to back.
    pub fn iter(&self) -> impl Iterator<Item = MarkId> + '_ {
        self.chain.iter().copied()
    }
}

impl<R: PartialEq> MarkSet<R> {
    /// Whether two marks currently reference the same position.
    pub fn same_ref(&self, a: MarkId, b: MarkId) -> Option<bool> {
        Some(self.slot(a)?.payload == self.slot(b)?.payload)
    }
}
