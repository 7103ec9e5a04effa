use crate::external::PathResolver;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable session state shared by the interpreter and its commands.
///
/// - `current_dir`: working directory; relative paths given to built-ins are
///   taken relative to it, and `down`/`up` keep it in sync with the process cwd.
/// - `should_exit`: set by `finish`; the REPL stops once it is true.
/// - `resolver`: the search path used for external commands, fixed at startup.
#[derive(Debug, Clone)]
pub struct Environment {
    pub current_dir: PathBuf,
    pub should_exit: bool,
    pub resolver: PathResolver,
}

impl Environment {
    /// Capture the process working directory with the default search path.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            should_exit: false,
            resolver: PathResolver::default(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
