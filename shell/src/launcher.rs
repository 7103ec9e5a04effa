use crate::error::ShellError;
use crate::relay::InterruptRelay;
use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::{CStr, CString};
use std::fmt;

/// Status a child exits with when its program image could not be replaced.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// How a launched child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReport {
    Exited(i32),
    Signaled(Signal),
}

impl TerminationReport {
    /// Shell-style exit code: the status itself, or 128 + signal number.
    pub fn exit_code(&self) -> i32 {
        match self {
            TerminationReport::Exited(code) => *code,
            TerminationReport::Signaled(signal) => 128 + *signal as i32,
        }
    }
}

impl fmt::Display for TerminationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReport::Exited(code) => {
                write!(f, "terminated normally with return code {code}")
            }
            TerminationReport::Signaled(signal) => {
                write!(f, "terminated by signal {}", *signal as i32)
            }
        }
    }
}

/// Runs `executable` in a child process and blocks until it terminates.
///
/// `argv` is handed to the new program untouched, so `argv[0]` stays whatever the
/// user typed even when `executable` is a search-path expansion of it.
///
/// The child ignores SIGINT; while it runs, an interrupt received here kills it
/// (see [`InterruptRelay`]). A failed fork is reported as
/// [`ShellError::SpawnFailure`]. A failed exec is not an error at this level: the
/// child reports it on stderr and exits with [`EXEC_FAILURE_STATUS`].
pub fn launch(executable: &str, argv: &[String]) -> Result<TerminationReport, ShellError> {
    let path = to_cstring(executable)?;
    let c_argv = argv
        .iter()
        .map(|arg| to_cstring(arg))
        .collect::<Result<Vec<_>, _>>()?;
    let exec_failure = format!("pshell: cannot execute {executable}: ");

    // SAFETY: between fork and exec the child only calls async-signal-safe
    // functions on data prepared above.
    match unsafe { unistd::fork() }.map_err(ShellError::SpawnFailure)? {
        ForkResult::Child => exec_child(&path, &c_argv, exec_failure.as_bytes()),
        ForkResult::Parent { child } => {
            debug!("started {executable} as pid {child} with argv {argv:?}");
            let relay = match InterruptRelay::arm(child) {
                Ok(relay) => relay,
                Err(err) => {
                    let _ = signal::kill(child, Signal::SIGKILL);
                    let _ = waitpid(child, None);
                    return Err(err);
                }
            };
            let report = wait_for(child);
            drop(relay);
            report
        }
    }
}

fn to_cstring(arg: &str) -> Result<CString, ShellError> {
    CString::new(arg).map_err(|_| ShellError::InvalidArgument(arg.to_string()))
}

fn exec_child(path: &CStr, argv: &[CString], exec_failure: &[u8]) -> ! {
    // SAFETY: SIG_IGN installs no handler code; the setting survives exec.
    let _ = unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) };

    let Err(errno) = unistd::execv(path, argv);
    let stderr = std::io::stderr();
    let _ = unistd::write(&stderr, exec_failure);
    let _ = unistd::write(&stderr, errno.desc().as_bytes());
    let _ = unistd::write(&stderr, b"\n");
    // SAFETY: _exit skips the atexit handlers and stdio buffers inherited from
    // the parent, which must only be run or flushed once.
    unsafe { nix::libc::_exit(EXEC_FAILURE_STATUS) }
}

fn wait_for(child: Pid) -> Result<TerminationReport, ShellError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(TerminationReport::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(TerminationReport::Signaled(signal));
            }
            Ok(other) => debug!("pid {child}: ignoring wait status {other:?}"),
            Err(Errno::EINTR) => continue,
            Err(source) => {
                return Err(ShellError::WaitFailure {
                    pid: child.as_raw(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::active_launch;
    use crate::test_support::lock_process_state;
    use std::thread;
    use std::time::Duration;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reports_exit_code() {
        let _lock = lock_process_state();
        let report = launch("/bin/sh", &argv(&["sh", "-c", "exit 3"])).unwrap();
        assert_eq!(report, TerminationReport::Exited(3));
        assert_eq!(report.to_string(), "terminated normally with return code 3");
        assert_eq!(active_launch(), None);
    }

    #[test]
    fn reports_signal_termination() {
        let _lock = lock_process_state();
        let report = launch("/bin/sh", &argv(&["sh", "-c", "kill -9 $$"])).unwrap();
        assert_eq!(report, TerminationReport::Signaled(Signal::SIGKILL));
        assert_eq!(report.to_string(), "terminated by signal 9");
        assert_eq!(report.exit_code(), 137);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn argv0_is_the_typed_name_not_the_path() {
        let _lock = lock_process_state();
        let script = r#"case "$(tr '\000' ' ' < /proc/$$/cmdline)" in "typed-name "*) exit 0;; *) exit 1;; esac"#;
        let report = launch("/bin/sh", &argv(&["typed-name", "-c", script])).unwrap();
        assert_eq!(report, TerminationReport::Exited(0));
    }

    #[test]
    fn exec_failure_exits_with_127() {
        let _lock = lock_process_state();
        let missing = format!("./pshell-missing-{}", std::process::id());
        let report = launch(&missing, &argv(&[&missing])).unwrap();
        assert_eq!(report, TerminationReport::Exited(EXEC_FAILURE_STATUS));
    }

    /// Sends SIGINT to this process after `delay`, from another thread.
    fn interrupt_after(delay: Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(delay);
            signal::kill(unistd::getpid(), Signal::SIGINT).unwrap();
        })
    }

    #[test]
    fn interrupt_during_launch_kills_the_child() {
        let _lock = lock_process_state();
        let interrupter = interrupt_after(Duration::from_millis(500));
        let report = launch("/bin/sleep", &argv(&["sleep", "30"])).unwrap();
        interrupter.join().unwrap();

        assert_eq!(report, TerminationReport::Signaled(Signal::SIGKILL));
        assert_eq!(report.to_string(), "terminated by signal 9");
        assert_eq!(active_launch(), None);
    }

    #[test]
    fn child_cannot_be_interrupted_by_sigint_itself() {
        let _lock = lock_process_state();
        let report = launch("/bin/sh", &argv(&["sh", "-c", "kill -INT $$; exit 5"])).unwrap();
        assert_eq!(report, TerminationReport::Exited(5));
    }

    #[test]
    fn nul_byte_is_rejected_before_forking() {
        let err = launch("/bin/echo", &argv(&["echo", "a\0b"])).unwrap_err();
        assert!(matches!(err, ShellError::InvalidArgument(ref arg) if arg == "a\0b"));
        assert!(!err.is_fatal());
    }
}
