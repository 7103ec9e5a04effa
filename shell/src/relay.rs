//! Interrupt forwarding for the one external command the interpreter waits on.
//!
//! While a child runs, an operator interrupt (SIGINT) delivered to the interpreter
//! is turned into a SIGKILL for that child. The child never sees the interrupt
//! itself: it starts with SIGINT ignored, so it has no chance to trap it.
//! Outside of [`InterruptRelay`]'s lifetime no handler is installed and nothing
//! is forwarded.

use crate::error::ShellError;
use log::{debug, warn};
use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicI32, Ordering};

/// Pid of the child currently awaited, or 0 when none is.
///
/// This is the only state shared between the signal handler and the main flow.
static ACTIVE_LAUNCH: AtomicI32 = AtomicI32::new(0);

extern "C" fn relay_interrupt(_signal: c_int) {
    forward_interrupt();
}

/// Hard-kills the active child, if any. Returns whether a kill was sent.
///
/// Only touches an atomic and kill(2), both safe inside a signal handler.
pub(crate) fn forward_interrupt() -> bool {
    let pid = ACTIVE_LAUNCH.load(Ordering::SeqCst);
    if pid <= 0 {
        return false;
    }
    signal::kill(Pid::from_raw(pid), Signal::SIGKILL).is_ok()
}

/// The child interrupts are currently forwarded to.
pub fn active_launch() -> Option<Pid> {
    match ACTIVE_LAUNCH.load(Ordering::SeqCst) {
        0 => None,
        pid => Some(Pid::from_raw(pid)),
    }
}

/// Scoped SIGINT handler bound to a single child.
///
/// Dropping the relay restores whatever SIGINT disposition was in place before
/// [`InterruptRelay::arm`] and forgets the child.
#[must_use = "the relay is disarmed as soon as it is dropped"]
pub struct InterruptRelay {
    child: Pid,
    previous: SigAction,
}

impl InterruptRelay {
    /// Makes `child` the interrupt target and installs the forwarding handler.
    ///
    /// Fails with [`ShellError::Busy`] if another child is already armed.
    pub fn arm(child: Pid) -> Result<Self, ShellError> {
        ACTIVE_LAUNCH
            .compare_exchange(0, child.as_raw(), Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|active| ShellError::Busy { active })?;

        let action = SigAction::new(
            SigHandler::Handler(relay_interrupt),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only reads an atomic and calls kill(2).
        match unsafe { signal::sigaction(Signal::SIGINT, &action) } {
            Ok(previous) => {
                debug!("forwarding interrupts to pid {child}");
                Ok(Self { child, previous })
            }
            Err(errno) => {
                ACTIVE_LAUNCH.store(0, Ordering::SeqCst);
                Err(ShellError::Signal(errno))
            }
        }
    }
}

impl Drop for InterruptRelay {
    fn drop(&mut self) {
        let _ = ACTIVE_LAUNCH.compare_exchange(
            self.child.as_raw(),
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        // SAFETY: reinstates the disposition that was active before arm().
        if let Err(errno) = unsafe { signal::sigaction(Signal::SIGINT, &self.previous) } {
            warn!("failed to restore SIGINT disposition: {errno}");
        }
        debug!("stopped forwarding interrupts to pid {}", self.child);
    }
}
