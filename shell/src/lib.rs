//! A small interactive command interpreter.
//!
//! Lines typed at the `PShell>` prompt are split on whitespace. A handful of
//! filesystem built-ins (`files`, `info`, `delete`, `copy`, `where`, `down`, `up`)
//! run in-process and `finish` ends the session. Any other name is looked up on a
//! fixed search path (`/bin/`, `/usr/bin/`, `/usr/local/bin/`, `./`) and run in a
//! forked child that the interpreter waits for; Ctrl-C while it runs kills it.
//!
//! The main entry point is [`Interpreter`]. The public modules [`command`] and
//! [`env`] expose the traits and state used to plug in further commands, while
//! [`launcher`] and [`relay`] hold the process and signal handling.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod launcher;
pub mod relay;

pub use error::{ArityError, ShellError};
pub use external::{PathResolver, SEARCH_PATH};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{BANNER, Interpreter, LineReader, LineSource, PROMPT};
pub use launcher::TerminationReport;
