use nix::errno::Errno;

/// Failures raised by the command engine.
///
/// Everything except [`ShellError::SpawnFailure`] is reported on a single line and
/// the interpreter goes back to the prompt. A spawn failure ends the session.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Executable file {name} not found")]
    NotFound { name: String },

    #[error("{0}")]
    Arity(#[from] ArityError),

    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error("could not create a child process: {0}")]
    SpawnFailure(#[source] Errno),

    #[error("failed waiting for child {pid}: {source}")]
    WaitFailure {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("child {active} is still running, refusing to launch another")]
    Busy { active: i32 },

    #[error("could not update the interrupt handler: {0}")]
    Signal(#[source] Errno),
}

impl ShellError {
    /// Whether the interpreter has to stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::SpawnFailure(_))
    }
}

/// Wrong argument count for a command that declares a fixed arity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArityError {
    #[error("unexpected argument '{token}' for command {command}")]
    Unexpected { command: String, token: String },

    #[error("missing argument for command {command}")]
    Missing { command: String },
}

/// Checks that `args` holds exactly `expected` entries.
///
/// The excess case names the first token past the expected count.
pub fn check_args(command: &str, args: &[&str], expected: usize) -> Result<(), ArityError> {
    match args.len() {
        n if n == expected => Ok(()),
        n if n > expected => Err(ArityError::Unexpected {
            command: command.to_string(),
            token: args[expected].to_string(),
        }),
        _ => Err(ArityError::Missing {
            command: command.to_string(),
        }),
    }
}
