//! End-to-end kernel behavior: dispatch, auto-load, refresh ordering, close
//! propagation, idle draining, and the editor root's fixed handlers.

use std::cell::RefCell;
use std::rc::Rc;

use core_cmd::{CmdError, HANDLED};
use core_config::Config;
use core_editor::{CmdCtx, Command, Editor, keys, register_builtin};
use core_pane::{Damage, PaneId};
use pretty_assertions::assert_eq;

type Log = Rc<RefCell<Vec<(String, PaneId)>>>;

fn recorder(name: &str, log: &Log, ret: i32) -> Command {
    let log = log.clone();
    Command::closure(name.to_string(), move |_ed, ctx| {
        log.borrow_mut().push((ctx.key.clone(), ctx.focus));
        Ok(ret)
    })
}

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn key_handle_walks_up_until_handled() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let parent = ed.pane_register(ed.root(), 0, Some(recorder("parent", &log, 1)));
    let child = ed.pane_register(parent, 0, None);
    let grandchild = ed.pane_register(child, 0, Some(recorder("gc", &log, 0)));
    let r = ed.call("some-key", grandchild);
    assert_eq!(r, Ok(1));
    // The grandchild saw it first and declined; the parent consumed it.
    let keys_seen: Vec<String> = log.borrow().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys_seen, vec!["some-key".to_string(), "some-key".to_string()]);
}

#[test]
fn key_handle_errors_bubble_unchanged() {
    let mut ed = Editor::with_defaults();
    let failing = Command::closure("fail", |_ed, _ctx| Err(CmdError::Efail));
    let p = ed.pane_register(ed.root(), 0, Some(failing));
    assert_eq!(ed.call("k", p), Err(CmdError::Efail));
}

#[test]
fn fallthrough_counts_as_handled_but_keeps_ascending() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let parent = ed.pane_register(ed.root(), 0, Some(recorder("parent", &log, 0)));
    let fall = Command::closure("fall", |_ed, _ctx| Err(CmdError::Efallthrough));
    let child = ed.pane_register(parent, 0, Some(fall));
    let r = ed.call("k", child);
    assert_eq!(r, Ok(1), "fallthrough key ends up handled");
    assert_eq!(log.borrow().len(), 1, "parent still saw the key");
}

#[test]
fn unregistered_key_is_ignored_at_the_root() {
    let mut ed = Editor::with_defaults();
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("nobody-home", p), Ok(0));
}

#[test]
fn global_set_and_get_command_round_trip() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let focus = ed.root();
    let published = recorder("published", &log, 1);
    let r = ed.key_handle(
        &CmdCtx::new("global-set-command", focus)
            .with_str("my-command")
            .with_comm2(published),
    );
    assert_eq!(r, Ok(HANDLED));
    assert_eq!(ed.call("my-command", focus), Ok(1));

    // get-command hands the found value back through callback:comm.
    let got: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let got2 = got.clone();
    let cb = Command::closure("cb", move |_ed, ctx| {
        assert_eq!(ctx.key, keys::CALLBACK_COMM);
        *got2.borrow_mut() = ctx.comm2.as_ref().map(|c| c.name().to_string());
        Ok(1)
    });
    let r = ed.key_handle(
        &CmdCtx::new("global-get-command", focus)
            .with_str("my-command")
            .with_comm2(cb),
    );
    assert_eq!(r, Ok(HANDLED));
    assert_eq!(got.borrow().as_deref(), Some("published"));

    // A miss is "not handled".
    let r = ed.key_handle(&CmdCtx::new("global-get-command", focus).with_str("nope"));
    assert_eq!(r, Ok(0));
}

#[test]
fn global_set_command_requires_arguments() {
    let mut ed = Editor::with_defaults();
    let focus = ed.root();
    let r = ed.key_handle(&CmdCtx::new("global-set-command", focus).with_str("name-only"));
    assert_eq!(r, Err(CmdError::Enoarg));
}

#[test]
fn global_set_attr_sets_and_deletes() {
    let mut ed = Editor::with_defaults();
    let focus = ed.root();
    let r = ed.key_handle(
        &CmdCtx::new("global-set-attr", focus)
            .with_str("greeting")
            .with_str2("hello"),
    );
    assert_eq!(r, Ok(HANDLED));
    assert_eq!(
        ed.tree().attrs(ed.root()).unwrap().find("greeting"),
        Some("hello")
    );
    let r = ed.key_handle(&CmdCtx::new("global-set-attr", focus).with_str("greeting"));
    assert_eq!(r, Ok(HANDLED));
    assert_eq!(ed.tree().attrs(ed.root()).unwrap().find("greeting"), None);
}

#[test]
fn two_roots_share_the_global_registry_but_not_instance_state() {
    let mut ed1 = Editor::with_defaults();
    let mut ed2 = Editor::with_defaults();
    let log = new_log();
    ed1.global_register("shared-command", recorder("shared", &log, 1));
    ed1.instance_register("private-command", recorder("private", &log, 1));
    let f2 = ed2.root();
    assert_eq!(ed2.call("shared-command", f2), Ok(1));
    assert_eq!(ed2.call("private-command", f2), Ok(0));
    let f1 = ed1.root();
    assert_eq!(ed1.call("private-command", f1), Ok(1));
}

#[test]
fn autoload_loads_module_and_retries_once() {
    // Scenario: no handler for attach-view; the miss derives module
    // `lib-view`, whose stub init registers the key; the retry succeeds.
    register_builtin("lib-view", |ed| {
        ed.global_register(
            "attach-view",
            Command::closure("attach-view", |_ed, _ctx| Ok(1)),
        );
        Ok(1)
    });
    let mut ed = Editor::with_defaults();
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("attach-view", p), Ok(1));
}

#[test]
fn autoload_miss_with_barren_module_returns_zero() {
    // The stub init loads fine but registers nothing; the single retry must
    // not recurse into the auto-loader.
    register_builtin("lib-widget", |_ed| Ok(1));
    let mut ed = Editor::with_defaults();
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("attach-widget", p), Ok(0));
}

#[test]
fn autoload_class_prefixes_use_the_full_name() {
    register_builtin("doc-text", |ed| {
        ed.global_register(
            "attach-doc-text",
            Command::closure("attach-doc-text", |_ed, _ctx| Ok(7)),
        );
        Ok(1)
    });
    let mut ed = Editor::with_defaults();
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("attach-doc-text", p), Ok(7));
}

#[test]
fn autoload_missing_module_returns_zero() {
    let mut ed = Editor::with_defaults();
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("attach-no-such-thing", p), Ok(0));
}

#[test]
fn autoload_respects_config_opt_out() {
    register_builtin("lib-gadget", |ed| {
        ed.global_register(
            "attach-gadget",
            Command::closure("attach-gadget", |_ed, _ctx| Ok(1)),
        );
        Ok(1)
    });
    let mut config = Config::default();
    config.file.modules.autoload = false;
    let mut ed = Editor::new(config);
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("attach-gadget", p), Ok(0));
}

#[test]
fn refresh_invokes_handlers_in_z_order() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let r = ed.pane_register(ed.root(), 0, Some(recorder("r", &log, 1)));
    let c1 = ed.pane_register(r, 0, Some(recorder("c1", &log, 1)));
    let c2 = ed.pane_register(r, 1, Some(recorder("c2", &log, 1)));
    let c3 = ed.pane_register(r, 0, Some(recorder("c3", &log, 1)));
    for p in [r, c1, c2, c3] {
        ed.tree_mut().damage(p, Damage::CONTENT);
    }
    ed.pane_refresh(r);
    let order: Vec<PaneId> = log.borrow().iter().map(|(_, f)| *f).collect();
    assert_eq!(order, vec![r, c1, c3, c2]);
    // The z=1 stratum draws strictly above everything the z=0 stratum drew.
    assert!(ed.tree().abs_z(c2) > ed.tree().abs_zhi(c1).max(ed.tree().abs_zhi(c3)));
    assert_eq!(ed.tree().abs_zhi(r), ed.tree().abs_zhi(c2));
}

#[test]
fn refresh_clears_need_call_everywhere() {
    let mut ed = Editor::with_defaults();
    let a = ed.pane_register(ed.root(), 0, None);
    let b = ed.pane_register(a, 2, None);
    let c = ed.pane_register(b, 0, None);
    ed.tree_mut().damage(c, Damage::CONTENT | Damage::EVENTS);
    ed.tree_mut().damage(a, Damage::SIZE);
    ed.pane_refresh(a);
    for p in [ed.root(), a, b, c] {
        assert!(
            !ed.tree().damaged(p).intersects(Damage::NEED_CALL),
            "pane {p:?} still has {:?}",
            ed.tree().damaged(p)
        );
    }
}

#[test]
fn refresh_sends_damage_bits_with_promotion() {
    let mut ed = Editor::with_defaults();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    let handler = Command::closure("probe", move |_ed, ctx| {
        if ctx.key == keys::REFRESH {
            seen2.borrow_mut().push(ctx.num2);
        }
        Ok(1)
    });
    let p = ed.pane_register(ed.root(), 0, Some(handler));
    ed.tree_mut().damage(p, Damage::SIZE);
    ed.pane_refresh(p);
    let bits = Damage::from_bits_truncate(seen.borrow()[0] as u32);
    // SIZE promotes CONTENT, which promotes CURSOR.
    assert!(bits.contains(Damage::SIZE | Damage::CONTENT | Damage::CURSOR));
}

#[test]
fn refresh_handler_returning_two_is_reinvoked_post_order() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let order = log.clone();
    let parent_handler = Command::closure("parent", move |_ed, ctx| {
        order.borrow_mut().push((ctx.key.clone(), ctx.home));
        Ok(2)
    });
    let parent = ed.pane_register(ed.root(), 0, Some(parent_handler));
    let child = ed.pane_register(parent, 0, Some(recorder("child", &log, 1)));
    ed.tree_mut().damage(parent, Damage::CONTENT);
    ed.tree_mut().damage(child, Damage::CONTENT);
    ed.pane_refresh(parent);
    let homes: Vec<PaneId> = log.borrow().iter().map(|(_, h)| *h).collect();
    assert_eq!(homes, vec![parent, child, parent]);
}

#[test]
fn refresh_skips_closed_subtrees() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let a = ed.pane_register(ed.root(), 0, Some(recorder("a", &log, 1)));
    let b = ed.pane_register(a, 0, Some(recorder("b", &log, 1)));
    let c = ed.pane_register(b, 0, Some(recorder("c", &log, 1)));
    // Mark the middle pane closed (as mid-teardown would) without unlinking.
    ed.tree_mut().damage(b, Damage::CONTENT | Damage::CLOSED);
    ed.tree_mut().damage(c, Damage::CONTENT);
    ed.tree_mut().damage(a, Damage::CONTENT);
    ed.pane_refresh(a);
    let names: Vec<PaneId> = log.borrow().iter().map(|(_, f)| *f).collect();
    assert_eq!(names, vec![a], "closed subtree must not be visited");
}

#[test]
fn close_notifies_each_observer_exactly_once() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let source = ed.pane_register(ed.root(), 0, None);
    let observer = ed.pane_register(ed.root(), 0, Some(recorder("obs", &log, 1)));
    ed.tree_mut().add_notify(observer, source, "E").unwrap();
    ed.tree_mut().add_notify(observer, source, "F").unwrap();
    ed.pane_close(source);
    let events: Vec<(String, PaneId)> = log.borrow().clone();
    assert_eq!(
        events,
        vec![(keys::NOTIFY_CLOSE.to_string(), source)],
        "one Notify:Close with focus = source, despite two subscriptions"
    );
    // No further events ever arrive from the closed source.
    assert_eq!(ed.pane_notify("E", source), Ok(0));
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn pane_close_is_idempotent_and_final() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let p = ed.pane_register(ed.root(), 0, Some(recorder("p", &log, 1)));
    ed.pane_close(p);
    let calls_after_first_close = log.borrow().len();
    ed.pane_close(p);
    assert_eq!(log.borrow().len(), calls_after_first_close, "second close is a no-op");
    // The handler got Close exactly once and never runs again.
    assert_eq!(
        log.borrow().last().map(|(k, _)| k.clone()),
        Some(keys::CLOSE.to_string())
    );
    assert_eq!(ed.call("anything", p), Ok(0));
    assert!(!ed.tree().children_of(ed.root()).contains(&p), "unreachable from the root");
    // Deferred free happens at idle.
    assert_eq!(ed.panes_pending_free(), 1);
    ed.run_idle();
    assert_eq!(ed.panes_pending_free(), 0);
    assert!(!ed.tree().is_alive(p));
}

#[test]
fn close_recurses_children_and_reports_to_parent() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let parent = ed.pane_register(ed.root(), 0, Some(recorder("parent", &log, 1)));
    let mid = ed.pane_register(parent, 0, Some(recorder("mid", &log, 1)));
    let leaf = ed.pane_register(mid, 0, Some(recorder("leaf", &log, 1)));
    ed.pane_close(mid);
    let seen: Vec<(String, PaneId)> = log.borrow().clone();
    // Parent hears ChildClosed for mid; mid's subtree closes leaf-last —
    // each pane's own handler sees Close, children handled before the
    // closing pane's own Close.
    assert!(seen.contains(&(keys::CHILD_CLOSED.to_string(), mid)));
    let close_order: Vec<PaneId> = log
        .borrow()
        .iter()
        .filter(|(k, _)| k == keys::CLOSE)
        .map(|(_, f)| f)
        .copied()
        .collect();
    assert_eq!(close_order, vec![leaf, mid]);
    ed.run_idle();
    assert!(!ed.tree().is_alive(mid));
    assert!(!ed.tree().is_alive(leaf));
    assert!(ed.tree().is_alive(parent));
    assert!(
        ed.tree().damaged(parent).contains(Damage::SIZE),
        "parent re-layouts after losing a child"
    );
}

#[test]
fn idle_callbacks_drain_lifo_and_release() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    let a = recorder("A", &log, 1);
    let b = recorder("B", &log, 1);
    let focus = ed.root();
    ed.key_handle(&CmdCtx::new("editor-on-idle", focus).with_comm2(a.clone()))
        .unwrap();
    ed.key_handle(&CmdCtx::new("editor-on-idle", focus).with_comm2(b.clone()))
        .unwrap();
    assert_eq!(ed.idle_pending(), 2);
    assert_eq!(a.ref_count(), 2, "queue holds one reference");
    ed.run_idle();
    assert_eq!(ed.idle_pending(), 0);
    assert_eq!(log.borrow().len(), 2, "each fires exactly once");
    // LIFO: B before A. Both invocations carry the idle-callback key.
    // Identify entries by which command pushed them: recorder stores focus,
    // so distinguish via ref counts instead.
    assert_eq!(a.ref_count(), 1, "reference released after the tick");
    assert_eq!(b.ref_count(), 1);
    let keys_seen: Vec<String> = log.borrow().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys_seen,
        vec![keys::IDLE_CALLBACK.to_string(), keys::IDLE_CALLBACK.to_string()]
    );
}

#[test]
fn idle_callbacks_fire_newest_first() {
    let mut ed = Editor::with_defaults();
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let focus = ed.root();
    for name in ["A", "B"] {
        let order = order.clone();
        let cb = Command::closure(name, move |_ed, _ctx| {
            order.borrow_mut().push(name);
            Ok(1)
        });
        ed.key_handle(&CmdCtx::new("editor-on-idle", focus).with_comm2(cb))
            .unwrap();
    }
    ed.run_idle();
    assert_eq!(*order.borrow(), vec!["B", "A"]);
}

#[test]
fn notify_broadcast_through_request_and_call() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    // Only consume the notification itself; everything else falls through so
    // the Request can reach the root.
    let obs_log = log.clone();
    let obs_handler = Command::closure("obs", move |_ed, ctx| {
        if ctx.key == "Notify:global-message" {
            obs_log.borrow_mut().push((ctx.key.clone(), ctx.focus));
            Ok(3)
        } else {
            Ok(0)
        }
    });
    let observer = ed.pane_register(ed.root(), 0, Some(obs_handler));
    let r = ed.call("Request:Notify:global-message", observer);
    assert_eq!(r, Ok(1));
    let sender = ed.pane_register(ed.root(), 0, None);
    let r = ed.call("Call:Notify:global-message", sender);
    assert_eq!(r, Ok(3), "maximum positive observer return");
    let seen = log.borrow().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "Notify:global-message");
    assert_eq!(seen[0].1, ed.root(), "notification focus is the source");
}

#[test]
fn multicall_strips_prefix_and_dispatches() {
    let mut ed = Editor::with_defaults();
    let log = new_log();
    ed.global_register("do-thing", recorder("do-thing", &log, 5));
    let p = ed.pane_register(ed.root(), 0, None);
    assert_eq!(ed.call("global-multicall-do-thing", p), Ok(5));
    assert_eq!(log.borrow()[0].0, "do-thing");
}

#[test]
fn strsave_round_trips_equal_bytes() {
    let mut ed = Editor::with_defaults();
    let r1 = ed.strsave("attribute-name");
    let r2 = ed.strsave("attribute-name");
    assert_eq!(ed.str_get(r1), ed.str_get(r2));
    assert_eq!(ed.str_get(r1), "attribute-name");
    let r3 = ed.strnsave("héllo", 2);
    assert_eq!(ed.str_get(r3), "h", "trimmed back to a char boundary");
}

#[test]
fn editor_close_tears_down_every_pane() {
    let mut ed = Editor::with_defaults();
    let a = ed.pane_register(ed.root(), 0, None);
    let _b = ed.pane_register(a, 0, None);
    let _c = ed.pane_register(ed.root(), 1, None);
    ed.close();
    assert_eq!(ed.tree().alive_count(), 0);
}
