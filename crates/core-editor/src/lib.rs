//! core-editor: the editor root and everything that routes through it.
//!
//! The root is a singleton pane per editor instance. Its state owns the
//! process-wide global command registry (shared across roots) with a
//! per-instance registry chained in front, a chunked bump arena for short
//! strings, deferred-free lists for panes and marks, an idle-callback queue,
//! and the dynamic module loader. All dispatch — `comm_call`, `home_call`,
//! `key_handle`, `pane_notify` — and the damage-driven refresh walk live
//! here, on top of the tree mechanics from `core-pane`.
//!
//! Scheduling is single-threaded cooperative: every call is synchronous and
//! handlers must not block. Long operations yield by re-registering
//! themselves through `editor-on-idle`.

mod arena;
mod close;
mod command;
mod dispatch;
mod modules;
mod refresh;

pub use arena::{StrArena, StrRef};
pub use command::{CmdCtx, CmdFn, Command, MarkHandle, NO_NUMERIC};
pub use modules::{BuiltinInit, register_builtin};

use std::cell::RefCell;
use std::rc::Rc;

use core_config::Config;
use core_keymap::{KeymapChain, SharedKeymap};
use core_pane::{PaneId, PaneTree};
use tracing::{info, trace};

/// Key strings and prefixes reserved by the kernel. The spellings are stable
/// ABI: dynamically loaded modules dispatch on them.
pub mod keys {
    pub const CLOSE: &str = "Close";
    pub const CHILD_CLOSED: &str = "ChildClosed";
    pub const REFRESH: &str = "Refresh";
    pub const CLONE: &str = "Clone";
    pub const IDLE_CALLBACK: &str = "idle-callback";
    pub const PANE_CLEAR: &str = "pane-clear";
    pub const NOTIFY_CLOSE: &str = "Notify:Close";
    pub const CALLBACK_COMM: &str = "callback:comm";
    pub const CALLBACK_DOC: &str = "callback:doc";
    pub const CALLBACK_GET_ATTR: &str = "callback:get_attr";
    pub const CB: &str = "cb";
    pub const CB_ATTACH: &str = "cb:attach";
    pub const DOC_RELEASE_MARK: &str = "doc:release-mark";

    pub const PREFIX_GLOBAL: &str = "global-";
    pub const PREFIX_ATTACH: &str = "attach-";
    pub const PREFIX_EVENT: &str = "event:";
    pub const PREFIX_NOTIFY: &str = "Notify:";
    pub const PREFIX_REQUEST_NOTIFY: &str = "Request:Notify:";
    pub const PREFIX_CALL_NOTIFY: &str = "Call:Notify:";
    pub const PREFIX_DOC: &str = "doc:";
    pub const PREFIX_MODE_SET: &str = "Mode:set-";
    pub const PREFIX_ON_IDLE: &str = "on_idle-";
    pub const PREFIX_MULTICALL: &str = "global-multicall-";
}

/// Sentinel for cheap corruption detection. A mismatch at any public entry
/// is a fatal programming error, not a recoverable condition.
const MAGIC: u64 = 0x7472_656c_6c69_7321;

thread_local! {
    static GLOBAL_KEYMAP: SharedKeymap<Command> = core_keymap::shared();
}

/// The process-wide registry backing every editor root.
fn global_keymap() -> SharedKeymap<Command> {
    GLOBAL_KEYMAP.with(|g| g.clone())
}

pub(crate) struct IdleEntry {
    pub(crate) focus: PaneId,
    pub(crate) comm: Command,
}

/// One editor instance: the root pane plus the state hanging off it.
pub struct Editor {
    magic: u64,
    pub(crate) tree: PaneTree<Command>,
    pub(crate) root: PaneId,
    pub(crate) global: SharedKeymap<Command>,
    pub(crate) local: SharedKeymap<Command>,
    pub(crate) chain: KeymapChain<Command>,
    pub(crate) arena: StrArena,
    pub(crate) free_panes: Vec<PaneId>,
    pub(crate) free_marks: Vec<MarkHandle>,
    pub(crate) idle: Vec<IdleEntry>,
    pub(crate) loader: modules::ModuleLoader,
    pub(crate) config: Config,
}

impl Editor {
    pub fn new(config: Config) -> Self {
        let global = global_keymap();
        dispatch::install_root_handlers(&mut global.borrow_mut());
        let local = core_keymap::shared();
        let mut chain = KeymapChain::new();
        chain.push(local.clone());
        chain.push(global.clone());
        let mut tree = PaneTree::new();
        let root = tree.register(None, 0);
        let chunk_size = config.effective_chunk_size();
        let mut ed = Self {
            magic: MAGIC,
            tree,
            root,
            global,
            local,
            chain: chain.clone(),
            arena: StrArena::new(chunk_size),
            free_panes: Vec::new(),
            free_marks: Vec::new(),
            idle: Vec::new(),
            loader: modules::ModuleLoader::new(),
            config,
        };
        ed.tree
            .set_handler(root, Some(Command::lookup("editor-root", chain)));
        info!(target: "editor", chunk_size, "created");
        ed
    }

    /// An editor with default configuration (no config file consulted).
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    pub(crate) fn check_magic(&self) {
        assert!(self.magic == MAGIC, "editor root corrupted");
    }

    pub fn root(&self) -> PaneId {
        self.root
    }

    pub fn tree(&self) -> &PaneTree<Command> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut PaneTree<Command> {
        &mut self.tree
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The lookup chain for this instance: per-root registry in front of the
    /// global one.
    pub fn chain(&self) -> &KeymapChain<Command> {
        &self.chain
    }

    /// Register a command in the shared global registry.
    pub fn global_register(&mut self, key: impl Into<String>, comm: Command) {
        self.global.borrow_mut().add(key, comm);
    }

    /// Register a command visible to this root only.
    pub fn instance_register(&mut self, key: impl Into<String>, comm: Command) {
        self.local.borrow_mut().add(key, comm);
    }

    /// Create a pane under `parent` with the given z and handler.
    pub fn pane_register(
        &mut self,
        parent: PaneId,
        z: i32,
        handler: Option<Command>,
    ) -> PaneId {
        self.check_magic();
        let p = self.tree.register(Some(parent), z);
        if handler.is_some() {
            self.tree.set_handler(p, handler);
        }
        p
    }

    /// Attach shareable private data to a pane. Handlers clone the `Rc` back
    /// out with [`Editor::shared_data`] so they can borrow the state while
    /// still driving the editor.
    pub fn set_shared_data<T: 'static>(&mut self, p: PaneId, data: Rc<RefCell<T>>) {
        self.tree.set_data(p, Box::new(data));
    }

    pub fn shared_data<T: 'static>(&self, p: PaneId) -> Option<Rc<RefCell<T>>> {
        self.tree.data(p)?.downcast_ref::<Rc<RefCell<T>>>().cloned()
    }

    // --- string arena ---

    /// Save a short string until the editor root closes.
    pub fn strsave(&mut self, s: &str) -> StrRef {
        self.check_magic();
        self.arena.save(s)
    }

    /// Save at most `n` bytes of `s`, trimmed back to a char boundary.
    pub fn strnsave(&mut self, s: &str, n: usize) -> StrRef {
        let mut cut = n.min(s.len());
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.strsave(&s[..cut])
    }

    pub fn str_get(&self, r: StrRef) -> &str {
        self.arena.get(r)
    }

    // --- deferred freeing and idle ---

    /// Queue a mark for release on the next idle; the owning document is
    /// asked to drop it via `doc:release-mark`.
    pub fn mark_free(&mut self, mark: MarkHandle) {
        self.free_marks.push(mark);
    }

    /// Idle callbacks currently queued (latest registered last).
    pub fn idle_pending(&self) -> usize {
        self.idle.len()
    }

    pub fn panes_pending_free(&self) -> usize {
        self.free_panes.len()
    }

    /// One idle tick: drain queued idle callbacks in LIFO order, then drain
    /// the pane and mark freelists. Driven by the external event loop.
    pub fn run_idle(&mut self) {
        self.check_magic();
        let mut queue = std::mem::take(&mut self.idle);
        while let Some(entry) = queue.pop() {
            trace!(target: "editor.idle", comm = entry.comm.name(), "idle_callback");
            let ctx = CmdCtx::new(keys::IDLE_CALLBACK, entry.focus);
            let _ = self.comm_call(&entry.comm, &ctx);
            // The entry drops here, releasing the callback reference.
        }
        self.drain_freelists();
    }

    fn drain_freelists(&mut self) {
        let marks = std::mem::take(&mut self.free_marks);
        for handle in marks {
            if self.tree.is_alive(handle.doc) {
                let ctx = CmdCtx::new(keys::DOC_RELEASE_MARK, handle.doc).with_mark(handle);
                let _ = self.home_call(handle.doc, &ctx);
            }
        }
        let panes = std::mem::take(&mut self.free_panes);
        for p in panes {
            self.tree.remove_slot(p);
        }
    }

    /// Close the whole instance: close the root (which transitively closes
    /// every descendant) and drain the freelists one final time. The string
    /// arena is released when the `Editor` itself drops.
    pub fn close(&mut self) {
        self.check_magic();
        let root = self.root;
        self.pane_close(root);
        self.run_idle();
        info!(target: "editor", "closed");
    }
}
