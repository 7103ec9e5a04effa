use crate::command::{CommandFactory, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use log::{debug, info};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{BufRead, Write};

/// Prompt written before every line is read.
pub const PROMPT: &str = "PShell>";

/// Printed once when an interactive session starts.
pub const BANNER: &str = "Enter 'finish' to quit.";

/// Zero-sized factory for one command type defined in this crate: a builtin or
/// the external command launcher.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Where the REPL gets its input from.
pub trait LineSource {
    /// Show `prompt` and read one line. `Ok(None)` means the input is exhausted.
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        loop {
            match self.readline(prompt) {
                Ok(line) => return Ok(Some(line)),
                // Ctrl-C at the prompt only drops the line being typed.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Line source over any buffered reader, for scripted sessions.
pub struct LineReader<R> {
    reader: R,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for LineReader<R> {
    fn read_line(&mut self, _prompt: &str) -> anyhow::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// A minimal shell-like interpreter that can execute built-in and external commands.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried in order to create commands by name. See [`Default`] for the
/// factories included out of the box.
///
/// Example
/// ```
/// use pshell::Interpreter;
/// let mut sh = Interpreter::default();
/// let mut out = Vec::new();
/// sh.execute_line("finish right now", &mut out).unwrap();
/// assert!(sh.environment().should_exit);
/// assert!(out.is_empty());
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
        }
    }

    /// The default command set running against a prepared environment.
    pub fn with_environment(env: Environment) -> Self {
        Self {
            env,
            commands: default_commands(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// The first factory that recognizes `name` wins.
    pub fn run(
        &mut self,
        name: &str,
        args: &[&str],
        stdout: &mut dyn Write,
    ) -> anyhow::Result<ExitCode> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, args) {
                return cmd.execute(stdout, &mut self.env);
            }
        }
        Err(ShellError::NotFound {
            name: name.to_string(),
        }
        .into())
    }

    /// Split `line` on whitespace and run it.
    ///
    /// Recoverable failures are written to `stdout` as a single line. Only a
    /// fatal [`ShellError`] (a failed fork) is returned.
    pub fn execute_line(&mut self, line: &str, stdout: &mut dyn Write) -> anyhow::Result<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return Ok(());
        };

        match self.run(name, args, stdout) {
            Ok(code) => {
                debug!("{name} finished with code {code}");
                Ok(())
            }
            Err(err) => match err.downcast_ref::<ShellError>() {
                Some(shell_err) if shell_err.is_fatal() => Err(err),
                _ => {
                    debug!("{name}: {err:#}");
                    writeln!(stdout, "{err}")?;
                    Ok(())
                }
            },
        }
    }

    /// Read-Eval-Print Loop.
    ///
    /// Runs until `finish` is entered or the input ends.
    pub fn repl(&mut self, input: &mut dyn LineSource, stdout: &mut dyn Write) -> anyhow::Result<()> {
        info!("session started in {}", self.env.current_dir.display());
        while !self.env.should_exit {
            let Some(line) = input.read_line(PROMPT)? else {
                info!("end of input");
                break;
            };
            self.execute_line(&line, stdout)?;
            stdout.flush()?;
        }
        info!("session finished");
        Ok(())
    }
}

fn default_commands() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::*;
    use crate::external::ExternalCommand;
    vec![
        Box::new(Factory::<Finish>::default()),
        Box::new(Factory::<Files>::default()),
        Box::new(Factory::<Info>::default()),
        Box::new(Factory::<Delete>::default()),
        Box::new(Factory::<CopyFile>::default()),
        Box::new(Factory::<Where>::default()),
        Box::new(Factory::<Down>::default()),
        Box::new(Factory::<Up>::default()),
        Box::new(Factory::<ExternalCommand>::default()),
    ]
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - `finish`, which is never arity-checked
    /// - built-ins: `files`, `info`, `delete`, `copy`, `where`, `down`, `up`
    /// - external command launcher for everything else
    fn default() -> Self {
        Self::new(default_commands())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::PathResolver;
    use crate::test_support::{TempDir, lock_process_state};
    use std::fs;
    use std::io::Cursor;
    use std::os::unix::fs::PermissionsExt;

    /// Interpreter whose search path is `bin` followed by the default prefixes.
    fn interpreter_with_bin(bin: &TempDir) -> Interpreter {
        let mut env = Environment::new();
        let mut prefixes = vec![format!("{}/", bin.path().display())];
        prefixes.extend(crate::external::SEARCH_PATH.iter().map(|p| p.to_string()));
        env.resolver = PathResolver::with_prefixes(prefixes);
        Interpreter::with_environment(env)
    }

    fn install(bin: &TempDir, name: &str, body: &str) {
        let path = bin.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn output_of(sh: &mut Interpreter, line: &str) -> String {
        let mut out = Vec::new();
        sh.execute_line(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn blank_lines_do_nothing() {
        let mut sh = Interpreter::default();
        assert_eq!(output_of(&mut sh, ""), "");
        assert_eq!(output_of(&mut sh, "   \t  "), "");
        assert!(!sh.environment().should_exit);
    }

    #[test]
    fn finish_ignores_trailing_tokens() {
        let mut sh = Interpreter::default();
        assert_eq!(output_of(&mut sh, "finish now"), "");
        assert!(sh.environment().should_exit);
    }

    #[test]
    fn unknown_command_is_reported_without_spawning() {
        let bin = TempDir::new("dispatch_not_found");
        let mut sh = interpreter_with_bin(&bin);
        assert_eq!(
            output_of(&mut sh, "nope123 --flag"),
            "Executable file nope123 not found\n"
        );
    }

    #[test]
    fn builtins_report_arity_errors() {
        let mut sh = Interpreter::default();
        assert_eq!(
            output_of(&mut sh, "info"),
            "missing argument for command info\n"
        );
        assert_eq!(
            output_of(&mut sh, "files a b"),
            "unexpected argument 'a' for command files\n"
        );
        assert_eq!(
            output_of(&mut sh, "copy a"),
            "missing argument for command copy\n"
        );
    }

    #[test]
    fn builtin_names_shadow_the_search_path() {
        let _lock = lock_process_state();
        let bin = TempDir::new("dispatch_shadow");
        install(&bin, "where", "exit 42");
        let mut sh = interpreter_with_bin(&bin);
        let expected = format!("{}\n", sh.environment().current_dir.display());
        assert_eq!(output_of(&mut sh, "where"), expected);
    }

    #[test]
    fn external_command_reports_exit_code() {
        let _lock = lock_process_state();
        let bin = TempDir::new("dispatch_exit");
        install(&bin, "ok", "exit 0");
        install(&bin, "fails", "exit \"$1\"");
        let mut sh = interpreter_with_bin(&bin);

        assert_eq!(
            output_of(&mut sh, "ok"),
            "terminated normally with return code 0\n"
        );
        assert_eq!(
            output_of(&mut sh, "fails 4"),
            "terminated normally with return code 4\n"
        );
    }

    #[test]
    fn external_command_killed_by_signal() {
        let _lock = lock_process_state();
        let bin = TempDir::new("dispatch_signal");
        install(&bin, "suicide", "kill -9 $$");
        let mut sh = interpreter_with_bin(&bin);
        assert_eq!(output_of(&mut sh, "suicide"), "terminated by signal 9\n");
    }

    #[test]
    fn missing_literal_path_fails_in_the_child() {
        let _lock = lock_process_state();
        let mut sh = Interpreter::default();
        let line = format!("./pshell-no-such-program-{}", std::process::id());
        assert_eq!(
            output_of(&mut sh, &line),
            "terminated normally with return code 127\n"
        );
        assert!(!sh.environment().should_exit);
    }

    #[test]
    fn interrupt_kills_the_running_command_and_the_session_goes_on() {
        let _lock = lock_process_state();
        let mut sh = Interpreter::default();
        let interrupter = std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(500));
            nix::sys::signal::kill(nix::unistd::getpid(), nix::sys::signal::Signal::SIGINT)
                .unwrap();
        });
        assert_eq!(output_of(&mut sh, "sleep 30"), "terminated by signal 9\n");
        interrupter.join().unwrap();

        assert_eq!(crate::relay::active_launch(), None);
        assert!(!sh.environment().should_exit);
    }

    #[test]
    fn name_no_factory_accepts_is_not_found() {
        let mut sh = Interpreter::new(vec![]);
        let err = sh.run("anything", &[], &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShellError>(),
            Some(ShellError::NotFound { name }) if name == "anything"
        ));
        assert_eq!(output_of(&mut sh, "anything"), "Executable file anything not found\n");
    }

    struct ForkFails;

    impl crate::command::ExecutableCommand for ForkFails {
        fn execute(
            self: Box<Self>,
            _stdout: &mut dyn Write,
            _env: &mut Environment,
        ) -> anyhow::Result<ExitCode> {
            Err(ShellError::SpawnFailure(nix::errno::Errno::EAGAIN).into())
        }
    }

    impl CommandFactory for ForkFails {
        fn try_create(
            &self,
            _env: &Environment,
            _name: &str,
            _args: &[&str],
        ) -> Option<Box<dyn crate::command::ExecutableCommand>> {
            Some(Box::new(ForkFails))
        }
    }

    #[test]
    fn spawn_failure_ends_the_session() {
        let mut sh = Interpreter::new(vec![Box::new(ForkFails)]);
        let mut out = Vec::new();
        let err = sh.execute_line("anything", &mut out).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShellError>(),
            Some(ShellError::SpawnFailure(_))
        ));
        assert!(out.is_empty());

        let mut input = LineReader::new(Cursor::new("anything\nfinish\n"));
        assert!(sh.repl(&mut input, &mut out).is_err());
    }

    #[test]
    fn repl_stops_at_finish() {
        let tmp = TempDir::new("dispatch_repl");
        let mut env = Environment::new();
        env.current_dir = tmp.path().to_path_buf();
        let mut sh = Interpreter::with_environment(env);

        let script = "\nwhere\n   \nfinish extra tokens\nwhere\n";
        let mut input = LineReader::new(Cursor::new(script));
        let mut out = Vec::new();
        sh.repl(&mut input, &mut out).unwrap();

        let expected = format!("{}\n", tmp.path().display());
        assert_eq!(String::from_utf8(out).unwrap(), expected);
        assert!(sh.environment().should_exit);
    }

    #[test]
    fn repl_stops_at_end_of_input() {
        let mut sh = Interpreter::default();
        let mut input = LineReader::new(Cursor::new("files extra\n"));
        let mut out = Vec::new();
        sh.repl(&mut input, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "unexpected argument 'extra' for command files\n"
        );
        assert!(!sh.environment().should_exit);
    }
}
