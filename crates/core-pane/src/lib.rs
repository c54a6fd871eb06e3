//! core-pane: the display/handler tree.
//!
//! A pane is both a rectangle of screen real estate and a node in the handler
//! tree. This crate owns the tree mechanics — geometry, z-depth, damage bits,
//! focus, notifier edges, topology operations — and stays agnostic about what
//! a handler *is*: [`PaneTree`] is generic over the handler payload, and all
//! handler invocation (dispatch, close protocol, refresh) lives upstream in
//! the editor crate.

mod tree;
mod types;

pub use tree::PaneTree;
pub use types::{CURSOR_UNSET, Damage, NotifierEdge, PaneId, PointerMark};
