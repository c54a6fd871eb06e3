//! Pane tree mechanics: structure, geometry, damage, notifier edges.

use std::any::Any;
use std::mem;

use core_attr::AttrMap;
use core_cmd::CmdError;
use smallvec::SmallVec;
use tracing::trace;

use crate::types::{CURSOR_UNSET, Damage, NotifierEdge, PaneId, PointerMark};

struct Node<H> {
    generation: u32,
    parent: Option<PaneId>,
    /// Ordered child list; a newly registered child goes at the head.
    children: Vec<PaneId>,
    z: i32,
    abs_z: i32,
    abs_zhi: i32,
    focus: Option<PaneId>,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    cx: i32,
    cy: i32,
    damaged: Damage,
    handler: Option<H>,
    data: Option<Box<dyn Any>>,
    attrs: AttrMap,
    pointer: Option<PointerMark>,
    /// Outgoing edges: panes observing this one.
    notifiees: SmallVec<[NotifierEdge; 2]>,
    /// Incoming edges: panes this one observes.
    notifiers: SmallVec<[NotifierEdge; 2]>,
}

impl<H> Node<H> {
    fn new(generation: u32, z: i32) -> Self {
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            z,
            abs_z: 0,
            abs_zhi: 0,
            focus: None,
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            cx: CURSOR_UNSET,
            cy: CURSOR_UNSET,
            damaged: Damage::empty(),
            handler: None,
            data: None,
            attrs: AttrMap::new(),
            pointer: None,
            notifiees: SmallVec::new(),
            notifiers: SmallVec::new(),
        }
    }
}

/// The pane arena. Generic over the handler payload `H`; all handler
/// invocation happens upstream.
pub struct PaneTree<H> {
    slots: Vec<Option<Node<H>>>,
    generations: Vec<u32>,
    free: Vec<usize>,
}

impl<H> std::fmt::Debug for PaneTree<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let alive = self.slots.iter().filter(|s| s.is_some()).count();
        f.debug_struct("PaneTree")
            .field("slots_total", &self.slots.len())
            .field("slots_alive", &alive)
            .field("free_list", &self.free.len())
            .finish_non_exhaustive()
    }
}

impl<H> Default for PaneTree<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> PaneTree<H> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
        }
    }

    // --- liveness and raw access ---

    pub fn is_alive(&self, p: PaneId) -> bool {
        self.slots
            .get(p.idx())
            .and_then(|s| s.as_ref())
            .map(|n| n.generation == p.1)
            .unwrap_or(false)
    }

    pub fn alive_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn get(&self, p: PaneId) -> Option<&Node<H>> {
        let n = self.slots.get(p.idx())?.as_ref()?;
        (n.generation == p.1).then_some(n)
    }

    fn get_mut(&mut self, p: PaneId) -> Option<&mut Node<H>> {
        let n = self.slots.get_mut(p.idx())?.as_mut()?;
        (n.generation == p.1).then_some(n)
    }

    /// Internal access; panics on a stale id.
    fn node(&self, p: PaneId) -> &Node<H> {
        self.get(p).expect("dangling PaneId")
    }

    fn node_mut(&mut self, p: PaneId) -> &mut Node<H> {
        self.get_mut(p).expect("dangling PaneId")
    }

    // --- creation and topology ---

    /// Allocate a pane and link it at the head of `parent`'s child list. The
    /// parent claims it as focus if it had none. Panics if `parent` is stale.
    pub fn register(&mut self, parent: Option<PaneId>, z: i32) -> PaneId {
        let id = if let Some(idx) = self.free.pop() {
            let generation = self.generations[idx].wrapping_add(1);
            self.generations[idx] = generation;
            self.slots[idx] = Some(Node::new(generation, z));
            PaneId::new(idx as u32, generation)
        } else {
            let generation = 1;
            self.generations.push(generation);
            self.slots.push(Some(Node::new(generation, z)));
            PaneId::new((self.slots.len() - 1) as u32, generation)
        };
        if let Some(par) = parent {
            let pn = self.node_mut(par);
            pn.children.insert(0, id);
            if pn.focus.is_none() {
                pn.focus = Some(id);
            }
            self.node_mut(id).parent = Some(par);
        }
        trace!(target: "pane", pane = id.0, parent = parent.map(|p| p.0), z, "register");
        id
    }

    pub fn parent_of(&self, p: PaneId) -> Option<PaneId> {
        self.get(p)?.parent
    }

    pub fn children_of(&self, p: PaneId) -> &[PaneId] {
        self.get(p).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Head of the child list (the most recently linked child).
    pub fn first_child(&self, p: PaneId) -> Option<PaneId> {
        self.get(p)?.children.first().copied()
    }

    pub fn root_of(&self, p: PaneId) -> PaneId {
        let mut cur = p;
        while let Some(parent) = self.parent_of(cur) {
            cur = parent;
        }
        cur
    }

    /// True when `a` is a strict ancestor of `b`.
    pub fn is_ancestor(&self, a: PaneId, b: PaneId) -> bool {
        let mut cur = self.parent_of(b);
        while let Some(p) = cur {
            if p == a {
                return true;
            }
            cur = self.parent_of(p);
        }
        false
    }

    /// Detach `p` from its parent, fixing the parent's focus. Returns the old
    /// parent.
    pub fn unlink(&mut self, p: PaneId) -> Option<PaneId> {
        let old = self.get(p)?.parent?;
        let pn = self.node_mut(old);
        pn.children.retain(|c| *c != p);
        if pn.focus == Some(p) {
            pn.focus = None;
        }
        self.node_mut(p).parent = None;
        Some(old)
    }

    /// Move `p` under `new_parent`. Fails rather than create a cycle.
    pub fn reparent(&mut self, p: PaneId, new_parent: PaneId) -> Result<(), CmdError> {
        if !self.is_alive(p) || !self.is_alive(new_parent) {
            return Err(CmdError::Efail);
        }
        if p == new_parent || self.is_ancestor(p, new_parent) {
            return Err(CmdError::Efail);
        }
        if self.get(p).and_then(|n| n.parent) == Some(new_parent) {
            return Ok(());
        }
        if let Some(old) = self.unlink(p) {
            self.damage(old, Damage::CONTENT);
        }
        let pn = self.node_mut(new_parent);
        pn.children.insert(0, p);
        if pn.focus.is_none() {
            pn.focus = Some(p);
        }
        self.node_mut(p).parent = Some(new_parent);
        self.damage(new_parent, Damage::SIZE);
        self.damage(p, Damage::SIZE);
        Ok(())
    }

    /// Swap handler, data and pointer mark between `p` and `parent`, then
    /// migrate `p`'s children to `parent`. Used for "become" transformations;
    /// `p` is left a leaf, typically to be closed by the caller.
    pub fn subsume(&mut self, p: PaneId, parent: PaneId) -> Result<(), CmdError> {
        if !self.is_alive(p) || !self.is_alive(parent) || p == parent {
            return Err(CmdError::Efail);
        }
        let (ph, pd, pm) = {
            let n = self.node_mut(p);
            (n.handler.take(), n.data.take(), n.pointer.take())
        };
        let (gh, gd, gm) = {
            let n = self.node_mut(parent);
            (
                mem::replace(&mut n.handler, ph),
                mem::replace(&mut n.data, pd),
                mem::replace(&mut n.pointer, pm),
            )
        };
        {
            let n = self.node_mut(p);
            n.handler = gh;
            n.data = gd;
            n.pointer = gm;
        }
        let kids = mem::take(&mut self.node_mut(p).children);
        let pfocus = self.node_mut(p).focus.take();
        for &c in &kids {
            self.node_mut(c).parent = Some(parent);
        }
        let pn = self.node_mut(parent);
        for c in kids.into_iter().rev() {
            pn.children.insert(0, c);
        }
        if pfocus.is_some() {
            pn.focus = pfocus;
        }
        self.damage(parent, Damage::SIZE | Damage::CONTENT);
        Ok(())
    }

    /// Final deferred free: reclaim the slot of an already-unlinked, childless
    /// pane (attribute storage goes with it).
    pub fn remove_slot(&mut self, p: PaneId) {
        if !self.is_alive(p) {
            return;
        }
        debug_assert!(self.node(p).children.is_empty(), "free of a pane with children");
        debug_assert!(self.node(p).parent.is_none(), "free of a still-linked pane");
        self.slots[p.idx()] = None;
        self.free.push(p.idx());
        trace!(target: "pane", pane = p.0, "slot_freed");
    }

    // --- focus ---

    pub fn focus_of(&self, p: PaneId) -> Option<PaneId> {
        self.get(p)?.focus
    }

    /// Set the focus child. `None` clears; otherwise the child must currently
    /// be in `p`'s child list.
    pub fn set_focus(&mut self, p: PaneId, child: Option<PaneId>) -> Result<(), CmdError> {
        let n = self.get_mut(p).ok_or(CmdError::Efail)?;
        if let Some(c) = child
            && !n.children.contains(&c)
        {
            return Err(CmdError::Efail);
        }
        n.focus = child;
        Ok(())
    }

    // --- handler, data, attributes, pointer ---

    pub fn set_handler(&mut self, p: PaneId, handler: Option<H>) {
        if let Some(n) = self.get_mut(p) {
            n.handler = handler;
        }
    }

    pub fn take_handler(&mut self, p: PaneId) -> Option<H> {
        self.get_mut(p)?.handler.take()
    }

    pub fn has_handler(&self, p: PaneId) -> bool {
        self.get(p).map(|n| n.handler.is_some()).unwrap_or(false)
    }

    pub fn set_data(&mut self, p: PaneId, data: Box<dyn Any>) {
        if let Some(n) = self.get_mut(p) {
            n.data = Some(data);
        }
    }

    pub fn data(&self, p: PaneId) -> Option<&dyn Any> {
        self.get(p)?.data.as_deref()
    }

    pub fn data_mut(&mut self, p: PaneId) -> Option<&mut dyn Any> {
        match self.get_mut(p)?.data.as_mut() {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    pub fn take_data(&mut self, p: PaneId) -> Option<Box<dyn Any>> {
        self.get_mut(p)?.data.take()
    }

    pub fn attrs(&self, p: PaneId) -> Option<&AttrMap> {
        self.get(p).map(|n| &n.attrs)
    }

    pub fn attrs_mut(&mut self, p: PaneId) -> Option<&mut AttrMap> {
        self.get_mut(p).map(|n| &mut n.attrs)
    }

    pub fn pointer(&self, p: PaneId) -> Option<PointerMark> {
        self.get(p)?.pointer
    }

    pub fn set_pointer(&mut self, p: PaneId, pointer: Option<PointerMark>) {
        if let Some(n) = self.get_mut(p) {
            n.pointer = pointer;
        }
    }

    // --- damage ---

    pub fn damaged(&self, p: PaneId) -> Damage {
        self.get(p).map(|n| n.damaged).unwrap_or(Damage::empty())
    }

    /// OR `bits` into the pane's damage. If anything new was added, walk up
    /// the parent chain ORing `CHILD`, stopping at the first pane that
    /// already carries it. `damage(p, empty)` is a no-op.
    pub fn damage(&mut self, p: PaneId, bits: Damage) {
        if bits.is_empty() {
            return;
        }
        let Some(n) = self.get_mut(p) else {
            return;
        };
        let before = n.damaged;
        n.damaged |= bits;
        if n.damaged == before {
            return;
        }
        trace!(target: "pane", pane = p.0, bits = bits.bits(), "damage");
        let mut cur = n.parent;
        while let Some(id) = cur {
            let Some(pn) = self.get_mut(id) else {
                break;
            };
            if pn.damaged.contains(Damage::CHILD) {
                break;
            }
            pn.damaged |= Damage::CHILD;
            cur = pn.parent;
        }
    }

    /// Clear `bits` without touching ancestors.
    pub fn clear_damage(&mut self, p: PaneId, bits: Damage) {
        if let Some(n) = self.get_mut(p) {
            n.damaged &= !bits;
        }
    }

    // --- geometry and cursor ---

    pub fn geom(&self, p: PaneId) -> Option<(i32, i32, i32, i32)> {
        self.get(p).map(|n| (n.x, n.y, n.w, n.h))
    }

    /// Update geometry. A negative `x` leaves the position unchanged and a
    /// non-positive `w` leaves the size unchanged. A position change damages
    /// `CONTENT`, a size change damages `SIZE`.
    pub fn resize(&mut self, p: PaneId, x: i32, y: i32, w: i32, h: i32) {
        let Some(n) = self.get_mut(p) else {
            return;
        };
        let mut dmg = Damage::empty();
        if x >= 0 && (n.x, n.y) != (x, y) {
            n.x = x;
            n.y = y;
            dmg |= Damage::CONTENT;
        }
        if w > 0 && (n.w, n.h) != (w, h) {
            n.w = w;
            n.h = h;
            dmg |= Damage::SIZE;
        }
        self.damage(p, dmg);
    }

    /// Match `p`'s size to its parent's `w×h`.
    pub fn check_size(&mut self, p: PaneId) {
        let Some(parent) = self.parent_of(p) else {
            return;
        };
        if let Some((_, _, w, h)) = self.geom(parent) {
            self.resize(p, -1, -1, w, h);
        }
    }

    pub fn cursor(&self, p: PaneId) -> Option<(i32, i32)> {
        let n = self.get(p)?;
        (n.cx != CURSOR_UNSET).then_some((n.cx, n.cy))
    }

    /// Place the cursor; negative coordinates unset it, out-of-bounds ones
    /// are rejected.
    pub fn set_cursor(&mut self, p: PaneId, cx: i32, cy: i32) -> Result<(), CmdError> {
        let n = self.get_mut(p).ok_or(CmdError::Efail)?;
        if cx < 0 || cy < 0 {
            n.cx = CURSOR_UNSET;
            n.cy = CURSOR_UNSET;
        } else if cx < n.w && cy < n.h {
            n.cx = cx;
            n.cy = cy;
        } else {
            return Err(CmdError::Efail);
        }
        self.damage(p, Damage::CURSOR);
        Ok(())
    }

    /// Absolute origin of `p`, summing offsets along the parent chain.
    pub fn abs_xy(&self, p: PaneId) -> Option<(i32, i32)> {
        let mut n = self.get(p)?;
        let (mut x, mut y) = (n.x, n.y);
        while let Some(parent) = n.parent {
            n = self.get(parent)?;
            x += n.x;
            y += n.y;
        }
        Some((x, y))
    }

    /// Translate absolute coordinates into `p`'s coordinate space.
    pub fn rel_xy(&self, p: PaneId, x: i32, y: i32) -> Option<(i32, i32)> {
        let (ax, ay) = self.abs_xy(p)?;
        Some((x - ax, y - ay))
    }

    // --- z handling ---

    pub fn z(&self, p: PaneId) -> Option<i32> {
        self.get(p).map(|n| n.z)
    }

    pub fn abs_z(&self, p: PaneId) -> i32 {
        self.get(p).map(|n| n.abs_z).unwrap_or(0)
    }

    /// Assign the refresh-time absolute z. Returns whether it changed.
    pub fn set_abs_z(&mut self, p: PaneId, abs_z: i32) -> bool {
        match self.get_mut(p) {
            Some(n) if n.abs_z != abs_z => {
                n.abs_z = abs_z;
                true
            }
            _ => false,
        }
    }

    pub fn abs_zhi(&self, p: PaneId) -> i32 {
        self.get(p).map(|n| n.abs_zhi).unwrap_or(0)
    }

    pub fn set_abs_zhi(&mut self, p: PaneId, abs_zhi: i32) {
        if let Some(n) = self.get_mut(p) {
            n.abs_zhi = abs_zhi;
        }
    }

    /// Children grouped by ascending z. Within a stratum, creation order
    /// (the reverse of the head-linked child list).
    pub fn children_z_strata(&self, p: PaneId) -> Vec<(i32, Vec<PaneId>)> {
        let Some(n) = self.get(p) else {
            return Vec::new();
        };
        let mut kids: Vec<PaneId> = n.children.iter().rev().copied().collect();
        kids.sort_by_key(|c| self.get(*c).map(|n| n.z).unwrap_or(0));
        let mut out: Vec<(i32, Vec<PaneId>)> = Vec::new();
        for c in kids {
            let z = self.get(c).map(|n| n.z).unwrap_or(0);
            match out.last_mut() {
                Some((gz, group)) if *gz == z => group.push(c),
                _ => out.push((z, vec![c])),
            }
        }
        out
    }

    /// Whether a descendant of `p` with `abs_z` above `z` covers the absolute
    /// point `(x, y)`. When not fully covered, `w` and `h` shrink to the
    /// unmasked prefix.
    pub fn masked(&self, p: PaneId, x: i32, y: i32, z: i32, w: &mut i32, h: &mut i32) -> bool {
        let Some((ox, oy)) = self.abs_xy(p) else {
            return false;
        };
        self.masked_rec(p, ox, oy, x, y, z, w, h)
    }

    #[allow(clippy::too_many_arguments)]
    fn masked_rec(
        &self,
        p: PaneId,
        ox: i32,
        oy: i32,
        x: i32,
        y: i32,
        z: i32,
        w: &mut i32,
        h: &mut i32,
    ) -> bool {
        for &c in self.children_of(p) {
            let Some(n) = self.get(c) else {
                continue;
            };
            if n.damaged.contains(Damage::CLOSED) {
                continue;
            }
            let (cx0, cy0) = (ox + n.x, oy + n.y);
            if n.abs_z > z {
                if cx0 <= x && x < cx0 + n.w && cy0 <= y && y < cy0 + n.h {
                    return true;
                }
                if cy0 <= y && y < cy0 + n.h && cx0 > x && cx0 < x + *w {
                    *w = cx0 - x;
                }
                if cx0 <= x && x < cx0 + n.w && cy0 > y && cy0 < y + *h {
                    *h = cy0 - y;
                }
            }
            if self.masked_rec(c, cx0, cy0, x, y, z, w, h) {
                return true;
            }
        }
        false
    }

    // --- notifier edges ---

    /// Subscribe `target` to `event` notifications from `source`. The edge is
    /// recorded symmetrically on both endpoints; duplicates are ignored.
    pub fn add_notify(
        &mut self,
        target: PaneId,
        source: PaneId,
        event: &str,
    ) -> Result<(), CmdError> {
        if !self.is_alive(target) || !self.is_alive(source) {
            return Err(CmdError::Efail);
        }
        if self
            .node(source)
            .notifiees
            .iter()
            .any(|e| e.peer == target && e.event == event)
        {
            return Ok(());
        }
        self.node_mut(source).notifiees.push(NotifierEdge {
            peer: target,
            event: event.to_string(),
        });
        self.node_mut(target).notifiers.push(NotifierEdge {
            peer: source,
            event: event.to_string(),
        });
        trace!(target: "pane", source = source.0, observer = target.0, event, "add_notify");
        Ok(())
    }

    /// Remove one subscription. Returns whether it existed.
    pub fn remove_notify(&mut self, target: PaneId, source: PaneId, event: &str) -> bool {
        let Some(sn) = self.get_mut(source) else {
            return false;
        };
        let before = sn.notifiees.len();
        sn.notifiees
            .retain(|e| !(e.peer == target && e.event == event));
        let existed = sn.notifiees.len() != before;
        if let Some(tn) = self.get_mut(target) {
            tn.notifiers
                .retain(|e| !(e.peer == source && e.event == event));
        }
        existed
    }

    /// The outgoing edges of `source` (its observers), cloned out.
    pub fn notifiee_edges(&self, source: PaneId) -> Vec<NotifierEdge> {
        self.get(source)
            .map(|n| n.notifiees.to_vec())
            .unwrap_or_default()
    }

    /// The incoming edges of `p` (who it observes), cloned out.
    pub fn notifier_edges(&self, p: PaneId) -> Vec<NotifierEdge> {
        self.get(p)
            .map(|n| n.notifiers.to_vec())
            .unwrap_or_default()
    }

    /// Observers of `source` subscribed to `event`.
    pub fn observers_of(&self, source: PaneId, event: &str) -> Vec<PaneId> {
        self.get(source)
            .map(|n| {
                n.notifiees
                    .iter()
                    .filter(|e| e.event == event)
                    .map(|e| e.peer)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `p` stops observing anyone: every incoming edge is removed from the
    /// corresponding source's outgoing list.
    pub fn drop_watching(&mut self, p: PaneId) {
        let edges = match self.get_mut(p) {
            Some(n) => mem::take(&mut n.notifiers),
            None => return,
        };
        for e in edges {
            if let Some(sn) = self.get_mut(e.peer) {
                sn.notifiees
                    .retain(|o| !(o.peer == p && o.event == e.event));
            }
        }
    }

    /// Drop every edge where `p` is the source, detaching its observers.
    pub fn drop_observers(&mut self, p: PaneId) {
        let edges = match self.get_mut(p) {
            Some(n) => mem::take(&mut n.notifiees),
            None => return,
        };
        for e in edges {
            if let Some(tn) = self.get_mut(e.peer) {
                tn.notifiers
                    .retain(|o| !(o.peer == p && o.event == e.event));
            }
        }
    }
}

impl<H: Clone> PaneTree<H> {
    pub fn handler_cloned(&self, p: PaneId) -> Option<H> {
        self.get(p)?.handler.clone()
    }
}
