//! Starting the supervised command and describing how it ended
//!
//! The child is spawned through `std::process::Command` rather than a bare
//! `fork()`. Before the new program image replaces the child, the
//! supervisor's listening socket is closed and the signal mask is cleared,
//! so the child neither holds the control channel open nor inherits the
//! supervisor's "everything blocked" posture.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::sys::signal::{pthread_sigmask, SigmaskHow, Signal, SigSet};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// Spawns one instance of the supervised command per call
#[derive(Debug, Clone)]
pub struct Launcher {
    program: OsString,
    args: Vec<OsString>,
}

impl Launcher {
    /// `command[0]` is the program, looked up in `PATH` if it has no
    /// slash, the rest are its arguments.
    pub fn new(command: &[OsString]) -> Launcher {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (OsString::new(), Vec::new()),
        };
        Launcher { program, args }
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Start the command, closing `listener` in the child.
    ///
    /// Failure to find or execute the program is reported here rather than
    /// as an exit of the child.
    pub fn launch(&self, listener: Option<RawFd>) -> Result<Pid> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        unsafe {
            cmd.pre_exec(move || {
                if let Some(fd) = listener {
                    libc::close(fd);
                }
                pthread_sigmask(SigmaskHow::SIG_SETMASK,
                                Some(&SigSet::empty()), None)
                    .map_err(io::Error::from)
            });
        }
        let child = cmd.spawn().map_err(|e| Error::Launch {
            program: self.program(),
            source: e,
        })?;
        // The loop reaps by pid, the handle is not needed
        Ok(Pid::from_raw(child.id() as i32))
    }
}

/// How a reaped child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(Signal),
}

impl ChildExit {
    /// Pid and outcome of a terminal wait status, `None` for anything that
    /// does not mean the process is gone.
    pub fn from_wait_status(status: WaitStatus) -> Option<(Pid, ChildExit)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, ChildExit::Exited(code))),
            WaitStatus::Signaled(pid, sig, _) => Some((pid, ChildExit::Signaled(sig))),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChildExit::Exited(0))
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Exited(code) => write!(f, "exited with status {}", code),
            ChildExit::Signaled(sig) => write!(f, "died from signal {}", sig),
        }
    }
}
