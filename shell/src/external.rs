use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use crate::launcher;
use anyhow::Result;
use log::debug;
use nix::unistd::{AccessFlags, access};
use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

/// Directories searched for bare command names, in this order.
pub const SEARCH_PATH: [&str; 4] = ["/bin/", "/usr/bin/", "/usr/local/bin/", "./"];

/// Turns a typed command name into the path that will be executed.
#[derive(Debug, Clone)]
pub struct PathResolver {
    prefixes: Vec<String>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::with_prefixes(SEARCH_PATH)
    }
}

impl PathResolver {
    /// Prefixes are concatenated with the command name as plain strings, so each
    /// one should end with a `/`.
    pub(crate) fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    /// Resolve a command name.
    ///
    /// - A name starting with `/` or `.` is returned as-is. Nothing is checked;
    ///   a missing or non-executable file only shows up when it is launched.
    /// - Any other name is tried against each prefix in order and the first
    ///   regular file the current user may execute wins.
    pub fn resolve<'a>(&self, name: &'a str) -> Result<Cow<'a, str>, ShellError> {
        if name.starts_with('/') || name.starts_with('.') {
            return Ok(Cow::Borrowed(name));
        }
        if !name.is_empty() {
            for prefix in &self.prefixes {
                let candidate = format!("{prefix}{name}");
                if is_executable(Path::new(&candidate)) {
                    return Ok(Cow::Owned(candidate));
                }
            }
        }
        Err(ShellError::NotFound {
            name: name.to_string(),
        })
    }
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

/// Command that is not a builtin.
///
/// Resolution happens on execution, so an unknown name becomes a
/// [`ShellError::NotFound`] from [`ExecutableCommand::execute`].
pub struct ExternalCommand {
    argv: Vec<String>,
}

impl ExternalCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let argv = std::iter::once(name)
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect();
        Some(Box::new(ExternalCommand::new(argv)))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let name = self.argv.first().map(String::as_str).unwrap_or_default();
        let executable = env.resolver.resolve(name)?;
        debug!("{name} resolved to {executable}");

        stdout.flush()?;
        let report = launcher::launch(&executable, &self.argv)?;
        writeln!(stdout, "{report}")?;
        Ok(report.exit_code())
    }
}
