//! Lifecycle of the supervised child
//!
//! ```text
//!            launched             exit, keep alive
//! Starting ───────────> Running ──────────────────> Starting
//!    │                     │
//!    │ stop                │ stop: SIGTERM + alarm
//!    │                     v
//!    │                  Stopping ──(alarm / second stop signal: SIGKILL)
//!    │                     │
//!    │                     │ exit
//!    v                     v
//! Terminated <─────────────┘
//! ```
//!
//! This type only tracks state and decides what to do; sending signals and
//! arming the alarm is up to the caller.

use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No process; the next step is to launch one
    Starting,
    /// The one instance is running and should be kept alive
    Running,
    /// The instance has been asked to terminate
    Stopping,
    /// Nothing left to do
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    KeepAlive,
    StopRequested,
}

/// Side effect the caller has to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nothing,
    /// Send `SIGTERM` and arm the termination timeout
    Terminate(Pid),
    /// Send `SIGKILL`
    Kill(Pid),
}

#[derive(Debug)]
pub struct SupervisedChild {
    state: LifecycleState,
    desired: DesiredState,
    pid: Option<Pid>,
}

impl SupervisedChild {
    pub fn new() -> SupervisedChild {
        SupervisedChild {
            state: LifecycleState::Starting,
            desired: DesiredState::KeepAlive,
            pid: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Whether a new instance should be started now.
    pub fn wants_launch(&self) -> bool {
        self.state == LifecycleState::Starting
            && self.desired == DesiredState::KeepAlive
    }

    /// A new instance is running as `pid`.
    ///
    /// Returns the pid that was tracked before, which should never happen:
    /// a launch is only due once the previous instance has been reaped.
    pub fn launched(&mut self, pid: Pid) -> Option<Pid> {
        self.state = LifecycleState::Running;
        self.pid.replace(pid)
    }

    /// A process exited. Returns `false` if it was not the tracked one, in
    /// which case nothing changes.
    pub fn exited(&mut self, pid: Pid) -> bool {
        if self.pid != Some(pid) {
            return false;
        }
        self.pid = None;
        self.state = match self.desired {
            DesiredState::KeepAlive => LifecycleState::Starting,
            DesiredState::StopRequested => LifecycleState::Terminated,
        };
        true
    }

    /// Somebody asked for the child to be stopped. Only the first request
    /// produces a `Terminate`; later ones are no-ops.
    pub fn request_stop(&mut self) -> Action {
        if self.desired == DesiredState::StopRequested {
            return Action::Nothing;
        }
        self.desired = DesiredState::StopRequested;
        match self.pid {
            Some(pid) => {
                self.state = LifecycleState::Stopping;
                Action::Terminate(pid)
            }
            None => {
                self.state = LifecycleState::Terminated;
                Action::Nothing
            }
        }
    }

    /// A stop signal was delivered to the supervisor itself. The first one
    /// is an ordinary stop request, any further one while stopping kills.
    pub fn signal_stop(&mut self) -> Action {
        match (self.state, self.pid) {
            (LifecycleState::Stopping, Some(pid)) => Action::Kill(pid),
            _ => self.request_stop(),
        }
    }

    /// The termination timeout expired.
    pub fn timed_out(&self) -> Action {
        match (self.state, self.pid) {
            (LifecycleState::Stopping, Some(pid)) => Action::Kill(pid),
            _ => Action::Nothing,
        }
    }
}

impl Default for SupervisedChild {
    fn default() -> SupervisedChild {
        SupervisedChild::new()
    }
}
