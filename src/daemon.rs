//! Detaching from the controlling terminal
//!
//! The classic double fork: the first child becomes a session leader, the
//! second child can never reacquire a terminal. Both parents exit
//! successfully, so the caller's shell sees the command return right away.
//!
//! Call this before anything else that holds process-wide state (signal
//! masks, sockets, threads).

use std::process;

use nix::unistd::{fork, setsid, ForkResult};

use crate::error::{Error, Result};

pub fn detach() -> Result<()> {
    fork_and_leave()?;
    setsid().map_err(Error::Detach)?;
    fork_and_leave()?;
    Ok(())
}

fn fork_and_leave() -> Result<()> {
    match unsafe { fork() }.map_err(Error::Detach)? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => Ok(()),
    }
}
