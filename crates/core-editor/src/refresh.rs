//! Damage-driven refresh: the top-down walk that assigns absolute z and
//! calls handlers for damaged panes.

use core_cmd::NOT_HANDLED;
use core_pane::{Damage, PaneId};
use tracing::trace;

use crate::command::CmdCtx;
use crate::{Editor, keys};

/// Handler return asking to be re-invoked post-order, after the children.
const REFRESH_POSTORDER: i32 = 2;

impl Editor {
    /// Refresh the tree containing `p`. Ascends to the root, then recurses
    /// top-down with a running absolute z. Guarantees: every damaged pane's
    /// handler sees `Refresh` exactly once per refresh, absolute z is
    /// consistent with the post-order maximum at the point of drawing, and
    /// closed subtrees are skipped entirely. Afterwards no pane carries
    /// `NEED_CALL`.
    pub fn pane_refresh(&mut self, p: PaneId) {
        self.check_magic();
        let root = self.tree.root_of(p);
        let abs_z = self.tree.abs_z(root);
        self.refresh_rec(root, abs_z);
    }

    fn refresh_rec(&mut self, p: PaneId, abs_z: i32) {
        if self.tree.damaged(p).contains(Damage::CLOSED) {
            self.tree.set_abs_zhi(p, abs_z);
            return;
        }
        self.tree.set_abs_z(p, abs_z);

        if self.tree.focus_of(p).is_none()
            && let Some(first) = self.tree.first_child(p)
        {
            let _ = self.tree.set_focus(p, Some(first));
        }

        let damage = self.tree.damaged(p);
        let mut postorder = false;
        let mut bits = Damage::empty();
        if damage.intersects(Damage::NEED_CALL) {
            bits = damage;
            if bits.contains(Damage::SIZE) {
                bits |= Damage::CONTENT;
            }
            if bits.contains(Damage::CONTENT) {
                bits |= Damage::CURSOR;
            }
            trace!(target: "pane", pane = p.0, bits = bits.bits(), "refresh_call");
            let ctx = CmdCtx::new(keys::REFRESH, p).with_num2(bits.bits() as i32);
            let ret = self.home_call(p, &ctx);
            self.tree.clear_damage(p, Damage::all() - Damage::CLOSED);
            match ret {
                Ok(NOT_HANDLED) => self.tree.check_size(p),
                Ok(REFRESH_POSTORDER) => postorder = true,
                _ => {}
            }
        } else {
            self.tree.clear_damage(p, Damage::CHILD | Damage::Z);
        }

        // Children grouped by ascending z. The z == 0 stratum shares the
        // parent's absolute z; each later stratum starts just above the
        // running maximum so it draws over everything beneath it.
        let mut hi = abs_z;
        for (z, members) in self.tree.children_z_strata(p) {
            let base = if z == 0 { abs_z } else { hi + 1 };
            for child in members {
                if self.tree.abs_z(child) != base {
                    self.tree.damage(child, Damage::Z);
                }
                self.refresh_rec(child, base);
                let child_hi = self.tree.abs_zhi(child);
                if child_hi > hi {
                    hi = child_hi;
                }
            }
        }

        if postorder {
            let ctx = CmdCtx::new(keys::REFRESH, p).with_num2(bits.bits() as i32);
            let _ = self.home_call(p, &ctx);
            self.tree.clear_damage(p, Damage::all() - Damage::CLOSED);
        }

        self.tree.set_abs_zhi(p, hi);
    }
}
