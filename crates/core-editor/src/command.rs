//! Command values and the invocation context.
//!
//! A [`Command`] is the universal message handler: a refcounted invocable
//! with the uniform signature `(&mut Editor, &CmdCtx) -> CmdResult`. Three
//! shapes exist — a plain function, a closure carrying its own state, and a
//! "lookup" command that resolves the context key in a registry chain and
//! invokes the hit. The last makes a pane's handler role data-driven.

use std::fmt;
use std::rc::Rc;

use core_cmd::CmdResult;
use core_keymap::KeymapChain;
use core_mark::MarkId;
use core_pane::PaneId;

use crate::Editor;

/// `num`/`num2` value meaning "no numeric argument supplied".
pub const NO_NUMERIC: i32 = i32::MIN;

/// A mark argument: the owning document pane plus the mark within its set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkHandle {
    pub doc: PaneId,
    pub mark: MarkId,
}

/// The invocation context passed to every handler.
#[derive(Debug, Clone)]
pub struct CmdCtx {
    /// The command key being delivered.
    pub key: String,
    /// The pane owning the handler being invoked.
    pub home: PaneId,
    /// The pane context for the call (origin of the event).
    pub focus: PaneId,
    pub num: i32,
    pub num2: i32,
    pub mark: Option<MarkHandle>,
    pub mark2: Option<MarkHandle>,
    pub str1: Option<String>,
    pub str2: Option<String>,
    /// Back-pointer to the command being invoked; filled in by dispatch.
    pub comm: Option<Command>,
    /// Callback command supplied by the caller.
    pub comm2: Option<Command>,
}

impl CmdCtx {
    pub fn new(key: impl Into<String>, focus: PaneId) -> Self {
        Self {
            key: key.into(),
            home: focus,
            focus,
            num: NO_NUMERIC,
            num2: NO_NUMERIC,
            mark: None,
            mark2: None,
            str1: None,
            str2: None,
            comm: None,
            comm2: None,
        }
    }

    pub fn with_num(mut self, num: i32) -> Self {
        self.num = num;
        self
    }

    pub fn with_num2(mut self, num2: i32) -> Self {
        self.num2 = num2;
        self
    }

    pub fn with_mark(mut self, mark: MarkHandle) -> Self {
        self.mark = Some(mark);
        self
    }

    pub fn with_mark2(mut self, mark2: MarkHandle) -> Self {
        self.mark2 = Some(mark2);
        self
    }

    pub fn with_str(mut self, s: impl Into<String>) -> Self {
        self.str1 = Some(s.into());
        self
    }

    pub fn with_str2(mut self, s: impl Into<String>) -> Self {
        self.str2 = Some(s.into());
        self
    }

    pub fn with_comm2(mut self, comm2: Command) -> Self {
        self.comm2 = Some(comm2);
        self
    }

    /// `num` unless absent.
    pub fn num_arg(&self) -> Option<i32> {
        (self.num != NO_NUMERIC).then_some(self.num)
    }

    /// `num2` unless absent.
    pub fn num2_arg(&self) -> Option<i32> {
        (self.num2 != NO_NUMERIC).then_some(self.num2)
    }
}

/// Plain-function handler signature.
pub type CmdFn = fn(&mut Editor, &CmdCtx) -> CmdResult;

pub(crate) enum CommandKind {
    Fn {
        name: &'static str,
        func: CmdFn,
    },
    Closure {
        name: String,
        #[allow(clippy::type_complexity)]
        func: Box<dyn Fn(&mut Editor, &CmdCtx) -> CmdResult>,
    },
    Lookup {
        name: String,
        chain: KeymapChain<Command>,
    },
}

/// A refcounted command value. Cloning shares the underlying handler.
#[derive(Clone)]
pub struct Command {
    pub(crate) inner: Rc<CommandKind>,
}

impl Command {
    pub fn from_fn(name: &'static str, func: CmdFn) -> Self {
        Self {
            inner: Rc::new(CommandKind::Fn { name, func }),
        }
    }

    pub fn closure(
        name: impl Into<String>,
        func: impl Fn(&mut Editor, &CmdCtx) -> CmdResult + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(CommandKind::Closure {
                name: name.into(),
                func: Box::new(func),
            }),
        }
    }

    /// A lookup command: resolve the context key in `chain`, then invoke the
    /// hit.
    pub fn lookup(name: impl Into<String>, chain: KeymapChain<Command>) -> Self {
        Self {
            inner: Rc::new(CommandKind::Lookup {
                name: name.into(),
                chain,
            }),
        }
    }

    pub fn name(&self) -> &str {
        match &*self.inner {
            CommandKind::Fn { name, .. } => name,
            CommandKind::Closure { name, .. } => name,
            CommandKind::Lookup { name, .. } => name,
        }
    }

    /// Same underlying handler (not just equal behavior).
    pub fn ptr_eq(&self, other: &Command) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this command wraps exactly the given plain function.
    pub fn is_fn(&self, func: CmdFn) -> bool {
        matches!(&*self.inner, CommandKind::Fn { func: f, .. } if std::ptr::fn_addr_eq(*f, func))
    }

    /// Current number of shared references, observable in tests checking
    /// release behavior.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.inner {
            CommandKind::Fn { .. } => "fn",
            CommandKind::Closure { .. } => "closure",
            CommandKind::Lookup { .. } => "lookup",
        };
        f.debug_struct("Command")
            .field("name", &self.name())
            .field("kind", &kind)
            .finish()
    }
}
