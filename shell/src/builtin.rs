use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::check_args;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use chrono::{DateTime, Local};
use nix::unistd::{AccessFlags, Uid, User, access};
use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Built-in commands known to the shell at compile time.
///
/// Builtins declare how many positional arguments they take. The count is
/// checked before anything else runs; only then are the arguments bound with
/// [`argh`] (`FromArgs`) and the command executed in-process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "files" or "down".
    fn name() -> &'static str;

    /// Exact number of arguments, or `None` to accept anything.
    fn arity() -> Option<usize>;

    /// Executes the command.
    ///
    /// Filesystem problems are reported on `stdout` and turned into a non-zero
    /// code; they never reach the interpreter as errors.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{e:#}")?;
                Ok(1)
            }
        }
    }
}

/// Stand-in for a builtin whose arguments were rejected.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        if let Some(expected) = T::arity() {
            if let Err(err) = check_args(name, args, expected) {
                return Some(Box::new(InvalidArgs {
                    output: err.to_string(),
                    is_error: true,
                }));
            }
        }
        // Everything after `--` is positional, so file names may start with `-`.
        let positional: Vec<&str> = std::iter::once("--").chain(args.iter().copied()).collect();
        Some(match T::from_args(&[name], &positional) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

fn print_row(stdout: &mut dyn Write, fields: &[&str], widths: &[usize]) -> Result<()> {
    let line: String = fields
        .iter()
        .zip(widths)
        .map(|(field, &width)| format!("{field:<width$}"))
        .collect();
    writeln!(stdout, "{}", line.trim_end())?;
    Ok(())
}

fn print_header(stdout: &mut dyn Write, headers: &[&str], widths: &[usize]) -> Result<()> {
    print_row(stdout, headers, widths)?;
    writeln!(stdout, "{}", "-".repeat(widths.iter().sum()))?;
    Ok(())
}

/// `dir` if the path (following links) is a directory, `link` for any other
/// symlink, `file` otherwise.
fn kind_of(path: &Path) -> &'static str {
    if path.is_dir() {
        "dir"
    } else if path.is_symlink() {
        "link"
    } else {
        "file"
    }
}

#[derive(FromArgs)]
/// end the session
pub struct Finish {
    #[argh(positional, greedy)]
    /// ignored; finish never checks its arguments
    pub _ignored: Vec<String>,
}

impl BuiltinCommand for Finish {
    fn name() -> &'static str {
        "finish"
    }

    fn arity() -> Option<usize> {
        None
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// list the entries of the current directory with their type
pub struct Files {}

impl BuiltinCommand for Files {
    fn name() -> &'static str {
        "files"
    }

    fn arity() -> Option<usize> {
        Some(0)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        const WIDTHS: [usize; 2] = [30, 15];
        let mut entries = fs::read_dir(&env.current_dir)
            .with_context(|| format!("files: can't read {}", env.current_dir.display()))?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        print_header(stdout, &["Name", "Type"], &WIDTHS)?;
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            print_row(stdout, &[name.as_str(), kind_of(&entry.path())], &WIDTHS)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// show type, owner, modification time, size and permissions of a path
pub struct Info {
    #[argh(positional)]
    /// file or directory to describe
    pub path: String,
}

impl BuiltinCommand for Info {
    fn name() -> &'static str {
        "info"
    }

    fn arity() -> Option<usize> {
        Some(1)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        const HEADERS: [&str; 6] = [
            "Name",
            "Type",
            "Owner",
            "Last Changed",
            "Size (bytes)",
            "Executable",
        ];
        const WIDTHS: [usize; 6] = [20, 15, 20, 30, 15, 15];

        let path = env.current_dir.join(&self.path);
        let Ok(meta) = fs::metadata(&path) else {
            writeln!(stdout, "File or directory does not exist.")?;
            return Ok(1);
        };

        let owner = User::from_uid(Uid::from_raw(meta.uid()))
            .ok()
            .flatten()
            .map(|user| user.name)
            .unwrap_or_else(|| meta.uid().to_string());
        let changed = DateTime::<Local>::from(meta.modified()?)
            .format("%b %d %Y %H:%M:%S")
            .to_string();
        let (size, executable) = if meta.is_dir() {
            (String::new(), "")
        } else {
            let executable = access(&path, AccessFlags::X_OK).is_ok();
            (
                meta.len().to_string(),
                if executable { "True" } else { "False" },
            )
        };

        print_header(stdout, &HEADERS, &WIDTHS)?;
        print_row(
            stdout,
            &[
                self.path.as_str(),
                kind_of(&path),
                owner.as_str(),
                changed.as_str(),
                size.as_str(),
                executable,
            ],
            &WIDTHS,
        )?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// remove a file
pub struct Delete {
    #[argh(positional)]
    /// file to remove
    pub path: String,
}

impl BuiltinCommand for Delete {
    fn name() -> &'static str {
        "delete"
    }

    fn arity() -> Option<usize> {
        Some(1)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let path = env.current_dir.join(&self.path);
        if !path.exists() {
            writeln!(stdout, "File does not exist so cannot be deleted.")?;
            return Ok(1);
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                writeln!(stdout, "File successfully removed")?;
                Ok(0)
            }
            Err(err) => {
                writeln!(stdout, "{err}")?;
                writeln!(stdout, "File was not deleted.")?;
                Ok(1)
            }
        }
    }
}

#[derive(FromArgs)]
/// copy a file to a destination that does not exist yet
pub struct CopyFile {
    #[argh(positional)]
    /// file to copy
    pub source: String,

    #[argh(positional)]
    /// path of the new copy
    pub destination: String,
}

impl BuiltinCommand for CopyFile {
    fn name() -> &'static str {
        "copy"
    }

    fn arity() -> Option<usize> {
        Some(2)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let source = env.current_dir.join(&self.source);
        let destination = env.current_dir.join(&self.destination);
        if !source.exists() {
            writeln!(stdout, "Source file does not exist.")?;
            return Ok(1);
        }
        if destination.exists() {
            writeln!(stdout, "Destination file already exists.")?;
            return Ok(1);
        }
        match fs::copy(&source, &destination) {
            Ok(_) => {
                writeln!(stdout, "File copied to {}", self.destination)?;
                Ok(0)
            }
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                writeln!(stdout, "Permission denied.")?;
                Ok(1)
            }
            Err(_) => {
                writeln!(stdout, "Failed copying file for unknown reason.")?;
                Ok(1)
            }
        }
    }
}

#[derive(FromArgs)]
/// print the current working directory
pub struct Where {}

impl BuiltinCommand for Where {
    fn name() -> &'static str {
        "where"
    }

    fn arity() -> Option<usize> {
        Some(0)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

fn change_dir(stdout: &mut dyn Write, env: &mut Environment, target: PathBuf) -> Result<ExitCode> {
    let canonical = fs::canonicalize(&target)
        .with_context(|| format!("can't canonicalize {}", target.display()))?;
    env::set_current_dir(&canonical)
        .with_context(|| format!("can't chdir to {}", canonical.display()))?;
    env.current_dir = canonical;
    writeln!(
        stdout,
        "Success, current directory: {}",
        env.current_dir.display()
    )?;
    Ok(0)
}

#[derive(FromArgs)]
/// change into a subdirectory
pub struct Down {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory
    pub directory: String,
}

impl BuiltinCommand for Down {
    fn name() -> &'static str {
        "down"
    }

    fn arity() -> Option<usize> {
        Some(1)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = env.current_dir.join(&self.directory);
        if !target.exists() {
            writeln!(stdout, "Directory does not exist.")?;
            return Ok(1);
        }
        if !target.is_dir() {
            writeln!(
                stdout,
                "File exists but is not a directory - cannot change working directory."
            )?;
            return Ok(1);
        }
        change_dir(stdout, env, target)
    }
}

#[derive(FromArgs)]
/// change into the parent directory
pub struct Up {}

impl BuiltinCommand for Up {
    fn name() -> &'static str {
        "up"
    }

    fn arity() -> Option<usize> {
        Some(0)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let Some(parent) = env.current_dir.parent().map(Path::to_path_buf) else {
            writeln!(stdout, "You are already at the top of the directory tree.")?;
            return Ok(1);
        };
        change_dir(stdout, env, parent)
    }
}
