//! Identifier, damage and edge types shared across the pane tree.

use core_mark::MarkId;

/// Generational pane identifier: slot index plus generation. A stale id
/// (generation mismatch after a close) is inert — accessors return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaneId(pub u32, pub u32);

impl PaneId {
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

bitflags::bitflags! {
    /// Damage bitset carried per pane. The bit numbering is stable ABI: it
    /// crosses module boundaries in `num2` of a `Refresh` invocation.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Damage: u32 {
        /// Geometry changed; the pane must re-layout.
        const SIZE = 1;
        /// Contents are stale and must be redrawn.
        const CONTENT = 2;
        /// Only the cursor position changed.
        const CURSOR = 4;
        /// Event bindings changed.
        const EVENTS = 8;
        /// Absolute z changed during the last refresh walk.
        const Z = 16;
        /// Some descendant is damaged.
        const CHILD = 32;
        /// The pane has been closed and awaits the deferred free.
        const CLOSED = 64;
        /// Any damage that requires the handler to be called on refresh.
        const NEED_CALL = 1 | 2 | 4 | 8;
    }
}

/// Cursor coordinate meaning "no cursor".
pub const CURSOR_UNSET: i32 = -1;

/// One end of a notification subscription. The same edge is recorded on the
/// source's outgoing list and the observer's incoming list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierEdge {
    pub peer: PaneId,
    pub event: String,
}

/// A pane's pointer mark: a mark inside some document pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerMark {
    pub doc: PaneId,
    pub mark: MarkId,
}
