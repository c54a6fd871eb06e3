//! The calling conventions: `comm_call`, `home_call`, `key_handle`,
//! `pane_notify`, and the fixed handlers installed on the editor root.

use core_cmd::{CmdError, CmdResult, HANDLED, NOT_HANDLED};
use core_keymap::Keymap;
use core_pane::PaneId;
use tracing::{debug, trace};

use crate::command::{CmdCtx, Command, CommandKind};
use crate::{Editor, IdleEntry, keys};

impl Editor {
    /// Invoke a specific command value. The context the handler sees carries
    /// the command itself as the source back-pointer.
    pub fn comm_call(&mut self, comm: &Command, ctx: &CmdCtx) -> CmdResult {
        self.check_magic();
        trace!(target: "dispatch", key = ctx.key.as_str(), comm = comm.name(), "comm_call");
        let mut ctx2 = ctx.clone();
        ctx2.comm = Some(comm.clone());
        match &*comm.inner {
            CommandKind::Fn { func, .. } => func(self, &ctx2),
            CommandKind::Closure { func, .. } => func(self, &ctx2),
            CommandKind::Lookup { chain, .. } => match chain.lookup(&ctx2.key) {
                Some(hit) => self.comm_call(&hit, ctx),
                None => Ok(NOT_HANDLED),
            },
        }
    }

    /// Invoke `pane`'s handler with `home` rebound to the pane. A pane
    /// without a handler is "not handled".
    pub fn home_call(&mut self, pane: PaneId, ctx: &CmdCtx) -> CmdResult {
        let Some(handler) = self.tree.handler_cloned(pane) else {
            return Ok(NOT_HANDLED);
        };
        let mut ctx2 = ctx.clone();
        ctx2.home = pane;
        self.comm_call(&handler, &ctx2)
    }

    /// The canonical high-level entry: start at `ctx.focus` and walk up the
    /// parent chain until a handler returns non-zero. `Efallthrough` counts
    /// as handled but keeps ascending; other errors bubble unchanged. At the
    /// root the default is to ignore the key.
    pub fn key_handle(&mut self, ctx: &CmdCtx) -> CmdResult {
        self.check_magic();
        trace!(target: "dispatch", key = ctx.key.as_str(), focus = ctx.focus.0, "key_handle");
        let mut cur = Some(ctx.focus);
        let mut fell_through = false;
        while let Some(p) = cur {
            match self.home_call(p, ctx) {
                Ok(NOT_HANDLED) => {}
                Err(CmdError::Efallthrough) => fell_through = true,
                other => return other,
            }
            cur = self.tree.parent_of(p);
        }
        if fell_through {
            Ok(HANDLED)
        } else {
            Ok(NOT_HANDLED)
        }
    }

    /// Build a minimal context and dispatch through [`Editor::key_handle`].
    pub fn call(&mut self, key: &str, focus: PaneId) -> CmdResult {
        self.key_handle(&CmdCtx::new(key, focus))
    }

    /// Deliver `event` synchronously to every observer of `source` that
    /// subscribed to it. Observers run before this returns; the result is
    /// the maximum positive return (0 when nobody handled it). Observer
    /// errors are logged and skipped so one observer cannot starve the rest.
    pub fn pane_notify(&mut self, event: &str, source: PaneId) -> CmdResult {
        let ctx = CmdCtx::new(event, source);
        self.pane_notify_ctx(event, source, &ctx)
    }

    /// As [`Editor::pane_notify`], with extra arguments carried in `base`.
    pub fn pane_notify_ctx(&mut self, event: &str, source: PaneId, base: &CmdCtx) -> CmdResult {
        self.check_magic();
        let observers = self.tree.observers_of(source, event);
        let mut best = NOT_HANDLED;
        for obs in observers {
            if !self.tree.is_alive(obs) {
                continue;
            }
            let mut ctx = base.clone();
            ctx.key = event.to_string();
            ctx.focus = source;
            match self.home_call(obs, &ctx) {
                Ok(n) if n > best => best = n,
                Ok(_) => {}
                Err(e) => {
                    debug!(target: "dispatch", event, observer = obs.0, code = e.code(), "notify_error");
                }
            }
        }
        Ok(best)
    }

    /// Deliver `Notify:Close` exactly once to every observer of `p`,
    /// whatever event they subscribed to, then detach them all.
    pub(crate) fn pane_notify_close(&mut self, p: PaneId) {
        let mut seen: Vec<PaneId> = Vec::new();
        for edge in self.tree.notifiee_edges(p) {
            if seen.contains(&edge.peer) {
                continue;
            }
            seen.push(edge.peer);
            if !self.tree.is_alive(edge.peer) {
                continue;
            }
            let ctx = CmdCtx::new(keys::NOTIFY_CLOSE, p);
            let _ = self.home_call(edge.peer, &ctx);
        }
        self.tree.drop_observers(p);
    }
}

// --- fixed root handlers -------------------------------------------------

/// Install the fixed top-level handlers into the global registry. Re-running
/// replaces each entry with an identical command, so a second editor root is
/// harmless.
pub(crate) fn install_root_handlers(map: &mut Keymap<Command>) {
    map.add(
        "global-set-attr",
        Command::from_fn("global-set-attr", global_set_attr),
    );
    map.add(
        "global-set-command",
        Command::from_fn("global-set-command", global_set_command),
    );
    map.add(
        "global-get-command",
        Command::from_fn("global-get-command", global_get_command),
    );
    map.add(
        "global-load-module",
        Command::from_fn("global-load-module", global_load_module),
    );
    map.add(
        "editor-on-idle",
        Command::from_fn("editor-on-idle", editor_on_idle),
    );
    map.add(keys::CLOSE, Command::from_fn("editor-close", editor_close));
    map.add_prefix(
        keys::PREFIX_ATTACH,
        Command::from_fn("attach-autoload", attach_autoload),
    );
    map.add_prefix(
        keys::PREFIX_EVENT,
        Command::from_fn("event-autoload", event_autoload),
    );
    map.add_prefix(
        keys::PREFIX_MULTICALL,
        Command::from_fn("global-multicall", global_multicall),
    );
    map.add_prefix(
        "Request:Notify:global-",
        Command::from_fn("request-notify-global", request_notify_global),
    );
    map.add_prefix(
        "Call:Notify:global-",
        Command::from_fn("call-notify-global", call_notify_global),
    );
}

/// `global-set-attr {str1=name, str2=value}`: set (or, without a value,
/// delete) an editor-wide attribute on the root pane.
fn global_set_attr(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let name = ctx.str1.as_deref().ok_or(CmdError::Enoarg)?;
    let root = ed.root;
    let attrs = ed.tree.attrs_mut(root).ok_or(CmdError::Efail)?;
    match &ctx.str2 {
        Some(val) => attrs.set(name, val.clone()),
        None => {
            attrs.del(name);
        }
    }
    Ok(HANDLED)
}

/// `global-set-command {str1=name, comm2}`: publish a command. With `str2`
/// present the pair `[str1, str2)` registers as a range.
fn global_set_command(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let name = ctx.str1.clone().ok_or(CmdError::Enoarg)?;
    let comm = ctx.comm2.clone().ok_or(CmdError::Enoarg)?;
    debug!(target: "dispatch", name = name.as_str(), comm = comm.name(), "set_command");
    match &ctx.str2 {
        Some(hi) => ed.global.borrow_mut().add_range(name, hi.clone(), comm)?,
        None => ed.global.borrow_mut().add(name, comm),
    }
    Ok(HANDLED)
}

/// `global-get-command {str1=name, comm2=callback}`: the found command is
/// delivered by invoking the callback with key `callback:comm`.
fn global_get_command(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let name = ctx.str1.as_deref().ok_or(CmdError::Enoarg)?;
    let Some(found) = ed.chain.lookup(name) else {
        return Ok(NOT_HANDLED);
    };
    if let Some(cb) = &ctx.comm2 {
        let cb = cb.clone();
        let cb_ctx = CmdCtx::new(keys::CALLBACK_COMM, ctx.focus)
            .with_str(name)
            .with_comm2(found);
        ed.comm_call(&cb, &cb_ctx)?;
    }
    Ok(HANDLED)
}

/// `global-load-module {str1=name}`: 1 on success, 0 when the module cannot
/// be found or its init fails.
fn global_load_module(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let name = ctx.str1.clone().ok_or(CmdError::Enoarg)?;
    if ed.load_module(&name) {
        Ok(HANDLED)
    } else {
        Ok(NOT_HANDLED)
    }
}

/// `editor-on-idle {focus, comm2}`: queue a callback for the next idle tick.
fn editor_on_idle(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let comm = ctx.comm2.clone().ok_or(CmdError::Enoarg)?;
    ed.idle.push(IdleEntry {
        focus: ctx.focus,
        comm,
    });
    Ok(HANDLED)
}

/// `Close` reaching the root closes the whole instance.
fn editor_close(ed: &mut Editor, _ctx: &CmdCtx) -> CmdResult {
    let root = ed.root;
    ed.pane_close(root);
    Ok(HANDLED)
}

/// Module name for an `attach-<x>` miss: `<x>` itself for the well-known
/// class prefixes, else `lib-` plus the suffix after the last dash.
fn attach_module_name(rest: &str) -> String {
    const CLASS_PREFIXES: [&str; 4] = ["doc-", "render-", "mode-", "display-"];
    if CLASS_PREFIXES.iter().any(|p| rest.starts_with(p)) {
        rest.to_string()
    } else {
        let suffix = rest.rsplit('-').next().unwrap_or(rest);
        format!("lib-{suffix}")
    }
}

/// Prefix handler for `attach-…`: load the implied module, then retry the
/// original key exactly once.
fn attach_autoload(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    if !ed.config.file.modules.autoload {
        return Ok(NOT_HANDLED);
    }
    let Some(rest) = ctx.key.strip_prefix(keys::PREFIX_ATTACH) else {
        return Ok(NOT_HANDLED);
    };
    let module = attach_module_name(rest);
    debug!(target: "editor.modules", key = ctx.key.as_str(), module = module.as_str(), "autoload");
    if !ed.load_module(&module) {
        return Ok(NOT_HANDLED);
    }
    match ed.chain.lookup(&ctx.key) {
        // Guard against resolving straight back to this handler when the
        // module loaded but registered nothing for the key.
        Some(hit) if !hit.is_fn(attach_autoload) => ed.comm_call(&hit, ctx),
        _ => Ok(NOT_HANDLED),
    }
}

/// Prefix handler for `event:…`: load the event-loop module, retry once.
fn event_autoload(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    if !ed.config.file.modules.autoload {
        return Ok(NOT_HANDLED);
    }
    if !ed.load_module("lib-event") {
        return Ok(NOT_HANDLED);
    }
    match ed.chain.lookup(&ctx.key) {
        Some(hit) if !hit.is_fn(event_autoload) => ed.comm_call(&hit, ctx),
        _ => Ok(NOT_HANDLED),
    }
}

/// `global-multicall-<key>`: strip the prefix, look the remainder up, call.
fn global_multicall(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let Some(rest) = ctx.key.strip_prefix(keys::PREFIX_MULTICALL) else {
        return Ok(NOT_HANDLED);
    };
    let Some(hit) = ed.chain.lookup(rest) else {
        return Ok(NOT_HANDLED);
    };
    let mut ctx2 = ctx.clone();
    ctx2.key = rest.to_string();
    ed.comm_call(&hit, &ctx2)
}

/// `Request:Notify:global-…`: install the caller as observer on the root
/// for the stripped event name.
fn request_notify_global(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let Some(event) = ctx.key.strip_prefix("Request:") else {
        return Ok(NOT_HANDLED);
    };
    let root = ed.root;
    ed.tree.add_notify(ctx.focus, root, event)?;
    Ok(HANDLED)
}

/// `Call:Notify:global-…`: broadcast the stripped event from the root.
fn call_notify_global(ed: &mut Editor, ctx: &CmdCtx) -> CmdResult {
    let Some(event) = ctx.key.strip_prefix("Call:") else {
        return Ok(NOT_HANDLED);
    };
    let event = event.to_string();
    let root = ed.root;
    ed.pane_notify_ctx(&event, root, ctx)
}
