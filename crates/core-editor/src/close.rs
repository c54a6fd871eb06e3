//! The pane close protocol.

use core_pane::{Damage, PaneId};
use tracing::debug;

use crate::command::CmdCtx;
use crate::{Editor, keys};

impl Editor {
    /// Close a pane and its subtree. Idempotent: a second call observes
    /// `CLOSED` and returns. The node itself is only freed on the next idle,
    /// so a pane may safely close itself from inside its own handler.
    ///
    /// Order of operations: mark closed, `ChildClosed` to the parent, unlink,
    /// drop the pane's own subscriptions, recursively close children,
    /// `Notify:Close` to observers, invoke the handler with `Close`, damage
    /// the parent with `SIZE`, defer the node onto the freelist.
    pub fn pane_close(&mut self, p: PaneId) {
        self.check_magic();
        if !self.tree.is_alive(p) {
            return;
        }
        if self.tree.damaged(p).contains(Damage::CLOSED) {
            return;
        }
        self.tree.damage(p, Damage::CLOSED);
        debug!(target: "pane", pane = p.0, "close");

        let parent = self.tree.parent_of(p);
        if let Some(par) = parent {
            let ctx = CmdCtx::new(keys::CHILD_CLOSED, p);
            let _ = self.home_call(par, &ctx);
        }
        self.tree.unlink(p);
        self.tree.drop_watching(p);

        // Leaf-last teardown by repeated first-child removal; each recursive
        // close unlinks the child it handled.
        while let Some(child) = self.tree.first_child(p) {
            self.pane_close(child);
        }

        self.pane_notify_close(p);

        let ctx = CmdCtx::new(keys::CLOSE, p);
        let _ = self.home_call(p, &ctx);
        // The handler must never run again for this pane.
        self.tree.take_handler(p);

        if let Some(par) = parent {
            self.tree.damage(par, Damage::SIZE);
        }
        self.free_panes.push(p);
    }
}
