//! core-cmd: the command return-code space.
//!
//! Every handler in the kernel speaks the same small signed-integer protocol:
//! a positive return means "handled" (the value is meaningful to the caller),
//! zero means "not handled, try the next option", and a small negative code
//! names an error kind. The negative codes cross module boundaries and are
//! therefore stable ABI; see [`CmdError::code`].

use thiserror::Error;

/// Error kinds reserved by the dispatch protocol.
///
/// The numeric values are part of the external ABI and must never change:
/// dynamically loaded modules compare raw codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CmdError {
    /// A required argument was absent from the invocation context.
    #[error("required argument missing")]
    Enoarg,
    /// The operation was attempted and failed.
    #[error("operation failed")]
    Efail,
    /// Handled, but the caller should keep trying parents as well.
    #[error("handled, continue with parents")]
    Efallthrough,
    /// A registration collided with an existing entry.
    #[error("registration conflict")]
    Econflict,
}

impl CmdError {
    /// Stable ABI code for this error kind.
    pub const fn code(self) -> i32 {
        match self {
            CmdError::Enoarg => -1,
            CmdError::Efail => -2,
            CmdError::Efallthrough => -3,
            CmdError::Econflict => -4,
        }
    }

    /// Inverse of [`CmdError::code`]; `None` for codes outside the reserved set.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(CmdError::Enoarg),
            -2 => Some(CmdError::Efail),
            -3 => Some(CmdError::Efallthrough),
            -4 => Some(CmdError::Econflict),
            _ => None,
        }
    }
}

/// Result of a command invocation. `Ok(0)` is "not handled"; positive values
/// are caller-defined "handled" results.
pub type CmdResult = Result<i32, CmdError>;

/// Conventional "not handled, fall through" return.
pub const NOT_HANDLED: i32 = 0;
/// Conventional "handled, nothing more to say" return.
pub const HANDLED: i32 = 1;

/// True when the result consumed the invocation (positive return).
pub fn is_handled(r: &CmdResult) -> bool {
    matches!(r, Ok(n) if *n > 0)
}

/// Collapse a result into the raw wire code.
pub fn as_code(r: &CmdResult) -> i32 {
    match r {
        Ok(n) => *n,
        Err(e) => e.code(),
    }
}
