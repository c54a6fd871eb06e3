//! core-doc: the contract between the kernel and document modules.
//!
//! A document is a protocol, not a type: an entity with a set of marks, a set
//! of attributes, and a home pane whose handler answers the `doc:` keys. The
//! kernel knows nothing about how a document represents a position — the mark
//! payload is opaque — it only maintains mark order and routes calls.
//!
//! This crate carries the key constants, typed wrappers over the dispatch
//! protocol for callers, and [`DocCore`], the scaffolding every document
//! shares (its mark set plus default handlers for mark release and identity
//! comparison). Concrete documents implement only their own step/ref/attr
//! semantics.

use std::cell::RefCell;
use std::rc::Rc;

use core_cmd::{CmdError, CmdResult, HANDLED, NOT_HANDLED};
use core_editor::{CmdCtx, Command, Editor, MarkHandle, keys};
use core_mark::MarkSet;
use core_pane::PaneId;
use tracing::trace;

pub const DOC_STEP: &str = "doc:step";
pub const DOC_SET_REF: &str = "doc:set-ref";
pub const DOC_GET_ATTR: &str = "doc:get-attr";
pub const DOC_LOAD_FILE: &str = "doc:load-file";
pub const DOC_SAME_FILE: &str = "doc:same-file";
pub const DOC_REPLACED: &str = "doc:replaced";
pub const DOC_SHARES_REF: &str = "doc:shares-ref";
pub const DOC_RELEASE_MARK: &str = keys::DOC_RELEASE_MARK;

/// One past the Unicode scalar range: "no more characters here".
pub const WEOF: u32 = 0x0011_0000;

/// `WEOF` in the positive return space of `doc:step`.
pub const WEOF_RET: i32 = WEOF as i32 + 1;

/// Encode a character into the positive return space (0 stays "not
/// handled").
pub fn char_ret(c: char) -> i32 {
    c as i32 + 1
}

/// Decode a `doc:step` return; `None` for `WEOF` or anything non-character.
pub fn ret_char(code: i32) -> Option<char> {
    if code <= 0 || code == WEOF_RET {
        return None;
    }
    char::from_u32((code - 1) as u32)
}

/// Yes/no answers for protocol queries (`doc:shares-ref`, `doc:same-file`):
/// 0 stays "not handled", so truth gets its own pair of codes.
pub const ANSWER_YES: i32 = 1;
pub const ANSWER_NO: i32 = 2;

// --- typed wrappers over the dispatch protocol ---------------------------

/// `doc:step`: next character at `mark` (or `None` at the end), optionally
/// advancing the mark.
pub fn step(
    ed: &mut Editor,
    doc: PaneId,
    mark: MarkHandle,
    forward: bool,
    advance: bool,
) -> Result<Option<char>, CmdError> {
    let ctx = CmdCtx::new(DOC_STEP, doc)
        .with_mark(mark)
        .with_num(forward as i32)
        .with_num2(advance as i32);
    match ed.home_call(doc, &ctx)? {
        NOT_HANDLED => Err(CmdError::Efail),
        WEOF_RET => Ok(None),
        code => Ok(ret_char(code)),
    }
}

/// `doc:set-ref`: position the mark at a canonical end of the document.
pub fn set_ref(ed: &mut Editor, doc: PaneId, mark: MarkHandle, to_start: bool) -> CmdResult {
    let ctx = CmdCtx::new(DOC_SET_REF, doc)
        .with_mark(mark)
        .with_num(to_start as i32);
    ed.home_call(doc, &ctx)
}

/// `doc:get-attr`: a string attribute at the mark, delivered through the
/// `callback:get_attr` convention.
pub fn get_attr(
    ed: &mut Editor,
    doc: PaneId,
    mark: MarkHandle,
    name: &str,
) -> Result<Option<String>, CmdError> {
    let out: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let slot = out.clone();
    let cb = Command::closure("get-attr-cb", move |_ed, ctx| {
        *slot.borrow_mut() = ctx.str2.clone();
        Ok(HANDLED)
    });
    let ctx = CmdCtx::new(DOC_GET_ATTR, doc)
        .with_mark(mark)
        .with_str(name)
        .with_comm2(cb);
    ed.home_call(doc, &ctx)?;
    Ok(out.borrow_mut().take())
}

/// `doc:load-file {str1=path}`.
pub fn load_file(ed: &mut Editor, doc: PaneId, path: &str) -> CmdResult {
    let ctx = CmdCtx::new(DOC_LOAD_FILE, doc).with_str(path);
    ed.home_call(doc, &ctx)
}

/// `doc:same-file {str1=path}`: [`ANSWER_YES`] when the document already
/// holds that file.
pub fn same_file(ed: &mut Editor, doc: PaneId, path: &str) -> CmdResult {
    let ctx = CmdCtx::new(DOC_SAME_FILE, doc).with_str(path);
    ed.home_call(doc, &ctx)
}

/// Broadcast `doc:replaced` to every view observing the document.
pub fn notify_replaced(ed: &mut Editor, doc: PaneId) -> CmdResult {
    ed.pane_notify(DOC_REPLACED, doc)
}

/// `doc:shares-ref`: whether two marks reference the same position
/// (identity, not mere adjacency).
pub fn shares_ref(
    ed: &mut Editor,
    doc: PaneId,
    a: MarkHandle,
    b: MarkHandle,
) -> Result<bool, CmdError> {
    let ctx = CmdCtx::new(DOC_SHARES_REF, doc).with_mark(a).with_mark2(b);
    match ed.home_call(doc, &ctx)? {
        ANSWER_YES => Ok(true),
        ANSWER_NO => Ok(false),
        _ => Err(CmdError::Efail),
    }
}

// --- shared document scaffolding -----------------------------------------

/// The state every document carries: its mark set. Concrete documents embed
/// this next to their own storage and forward unrecognized keys to
/// [`DocCore::dispatch_common`].
#[derive(Debug)]
pub struct DocCore<R> {
    pub marks: MarkSet<R>,
}

impl<R> Default for DocCore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> DocCore<R> {
    pub fn new() -> Self {
        Self {
            marks: MarkSet::new(),
        }
    }

    /// `doc:release-mark`: drop a mark queued on the editor's freelist.
    /// Stale handles are a no-op (release is idempotent).
    pub fn release_mark(&mut self, ctx: &CmdCtx) -> CmdResult {
        let handle = ctx.mark.ok_or(CmdError::Enoarg)?;
        let released = self.marks.release(handle.mark);
        trace!(target: "doc", mark = handle.mark.0, released, "release_mark");
        Ok(HANDLED)
    }
}

impl<R: PartialEq> DocCore<R> {
    /// `doc:shares-ref` over the opaque payloads.
    pub fn shares_ref(&self, ctx: &CmdCtx) -> CmdResult {
        let a = ctx.mark.ok_or(CmdError::Enoarg)?;
        let b = ctx.mark2.ok_or(CmdError::Enoarg)?;
        match self.marks.same_ref(a.mark, b.mark) {
            Some(true) => Ok(ANSWER_YES),
            Some(false) => Ok(ANSWER_NO),
            None => Err(CmdError::Efail),
        }
    }

    /// Answer the protocol keys every document shares; `None` when the key
    /// belongs to the concrete document.
    pub fn dispatch_common(&mut self, ctx: &CmdCtx) -> Option<CmdResult> {
        match ctx.key.as_str() {
            DOC_RELEASE_MARK => Some(self.release_mark(ctx)),
            DOC_SHARES_REF => Some(self.shares_ref(ctx)),
            _ => None,
        }
    }
}

/// Create a document's home pane under `parent`: handler installed, shared
/// state attached.
pub fn register_doc<T: 'static>(
    ed: &mut Editor,
    parent: PaneId,
    handler: Command,
    state: Rc<RefCell<T>>,
) -> PaneId {
    let pane = ed.pane_register(parent, 0, Some(handler));
    ed.set_shared_data(pane, state);
    pane
}
