//! Module loading: a compiled-in builtins table checked first, then dynamic
//! shared-object loading via `libloading`.
//!
//! A loadable object is named `trellis-<name>` with the platform dll suffix
//! and exposes `trellis_module_init`, invoked once with the editor root and
//! the module's origin directory so it can find bundled resources. Loaded
//! libraries stay resident until the editor root closes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CString, c_char};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use core_cmd::CmdResult;
use tracing::{debug, info, warn};

use crate::Editor;

/// Init signature for compiled-in modules. The init registers commands via
/// `global-set-command` (or [`Editor::global_register`]) and/or attaches
/// panes.
pub type BuiltinInit = fn(&mut Editor) -> CmdResult;

/// Init symbol resolved from a shared object.
type DynModuleInit = unsafe extern "C" fn(editor: *mut Editor, origin: *const c_char) -> i32;

const INIT_SYMBOL: &[u8] = b"trellis_module_init";

thread_local! {
    static BUILTINS: RefCell<HashMap<String, BuiltinInit>> = RefCell::new(HashMap::new());
}

/// Add a compiled-in module. Checked before any dynamic loading; later
/// registrations under the same name replace.
pub fn register_builtin(name: impl Into<String>, init: BuiltinInit) {
    BUILTINS.with(|b| b.borrow_mut().insert(name.into(), init));
}

fn builtin(name: &str) -> Option<BuiltinInit> {
    BUILTINS.with(|b| b.borrow().get(name).copied())
}

/// Keeps dynamically loaded libraries alive for the editor's lifetime.
pub(crate) struct ModuleLoader {
    libs: Vec<libloading::Library>,
    loaded: Vec<String>,
}

impl ModuleLoader {
    pub(crate) fn new() -> Self {
        Self {
            libs: Vec::new(),
            loaded: Vec::new(),
        }
    }

    fn already_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|n| n == name)
    }
}

impl Editor {
    /// Load a module by name: builtins first, then the configured module
    /// directories and finally the working directory. Returns whether the
    /// module's init ran without error; failure is reported to the caller as
    /// "not handled", never as a panic.
    pub fn load_module(&mut self, name: &str) -> bool {
        self.check_magic();
        if let Some(init) = builtin(name) {
            debug!(target: "editor.modules", module = name, "builtin_init");
            return match init(self) {
                Ok(_) => {
                    if !self.loader.already_loaded(name) {
                        self.loader.loaded.push(name.to_string());
                    }
                    true
                }
                Err(e) => {
                    warn!(target: "editor.modules", module = name, code = e.code(), "builtin_failed");
                    false
                }
            };
        }
        if self.loader.already_loaded(name) {
            // A previous dynamic load stays resident; its registrations are
            // already in the global registry.
            return true;
        }
        let file = format!("trellis-{name}{}", std::env::consts::DLL_SUFFIX);
        let mut candidates: Vec<PathBuf> = self
            .config
            .file
            .modules
            .dirs
            .iter()
            .map(|d| d.join(&file))
            .collect();
        candidates.push(PathBuf::from(&file));
        for path in candidates {
            if !path.exists() {
                continue;
            }
            return match self.load_dynamic(&path) {
                Ok(()) => {
                    self.loader.loaded.push(name.to_string());
                    true
                }
                Err(e) => {
                    warn!(target: "editor.modules", module = name, error = %e, "load_failed");
                    false
                }
            };
        }
        warn!(target: "editor.modules", module = name, file = file.as_str(), "not_found");
        false
    }

    fn load_dynamic(&mut self, path: &Path) -> anyhow::Result<()> {
        // SAFETY: loading and initializing a module runs arbitrary library
        // code; that is the contract of the module ABI. The symbol type must
        // match what conforming modules export.
        let lib = unsafe { libloading::Library::new(path) }
            .with_context(|| format!("loading {}", path.display()))?;
        let origin = path
            .parent()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        let origin_ref = self.arena.save(&origin);
        let origin_c = CString::new(origin).ok();
        let rc = {
            let init: libloading::Symbol<'_, DynModuleInit> =
                unsafe { lib.get(INIT_SYMBOL) }.context("resolving trellis_module_init")?;
            let origin_ptr = origin_c
                .as_ref()
                .map(|c| c.as_ptr())
                .unwrap_or(std::ptr::null());
            // SAFETY: the symbol has the documented init signature; the
            // editor pointer is valid for the duration of the call and the
            // origin string outlives it.
            unsafe { init(self as *mut Editor, origin_ptr) }
        };
        if rc < 0 {
            bail!("module init returned {rc}");
        }
        info!(
            target: "editor.modules",
            path = %path.display(),
            origin = self.arena.get(origin_ref),
            "loaded"
        );
        self.loader.libs.push(lib);
        Ok(())
    }
}
