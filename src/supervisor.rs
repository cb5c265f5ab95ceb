//! The supervisor event loop
//!
//! One thread, one blocking call. Each iteration:
//!
//! 1. wait in `pselect` with only the trapped signals unmasked, polling the
//!    control socket
//! 2. drain the signal counters and reap every exited child
//! 3. act on stop signals and the termination timeout
//! 4. accept a stop request from the control socket
//! 5. finish if the child is gone for good, otherwise relaunch it if needed
//!
//! Relaunching last means a stop request that arrives together with the
//! exit notification is seen before a new instance would be started.

use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{alarm, Pid};
use tracing::{debug, error, info, warn};

use crate::bucket::LeakyBucket;
use crate::config::SupervisorConfig;
use crate::control::ControlChannel;
use crate::error::{sys_err, Result};
use crate::launch::{ChildExit, Launcher};
use crate::lifecycle::{Action, LifecycleState, SupervisedChild};
use crate::trap::{SignalEvents, Trap};

pub struct Supervisor {
    config: SupervisorConfig,
    launcher: Launcher,
    child: SupervisedChild,
    bucket: LeakyBucket,
    control: ControlChannel,
    // Declared last so it is dropped last: the signal mask stays in place
    // until the socket is gone
    trap: Trap,
}

impl Supervisor {
    /// Mask signals and bind the control socket. Nothing is launched yet.
    pub fn new(config: SupervisorConfig) -> Result<Supervisor> {
        let config = config.validate()?;
        let trap = Trap::install()
            .map_err(|e| sys_err("setting up signal handling failed", e))?;
        let control = ControlChannel::bind(&config.socket_path)?;
        info!(socket = %config.socket_path.display(), "listening for stop requests");
        Ok(Supervisor {
            launcher: Launcher::new(&config.command),
            child: SupervisedChild::new(),
            bucket: LeakyBucket::new(&config.bucket),
            config: config,
            control: control,
            trap: trap,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.child.state()
    }

    /// Supervise until a stop request has been carried out.
    ///
    /// Only a failure to launch the very first instance is returned as an
    /// error; everything after that is logged and retried.
    pub fn run(mut self) -> Result<()> {
        self.bucket.acquire();
        self.launch()?;
        loop {
            self.wait();
            let events = self.trap.take();
            if events.child_exited > 0 {
                self.reap();
            }
            self.handle_signals(events);
            self.poll_control();

            if self.child.state() == LifecycleState::Terminated {
                self.finish();
                return Ok(());
            }
            if self.child.wants_launch() {
                self.relaunch();
            }
        }
    }

    fn wait(&self) {
        // While a launch is pending only poll, so control requests are
        // still noticed between attempts
        let timeout = match self.child.state() {
            LifecycleState::Starting => Some(Duration::ZERO),
            _ => None,
        };
        match self.trap.wait(self.control.listener_fd(), timeout) {
            Ok(wakeup) => debug!(?wakeup, "woke up"),
            Err(e) => {
                error!(error = %e, "waiting for events failed");
                self.retry_pause();
            }
        }
    }

    /// Collect every exited child; only the tracked one matters.
    fn reap(&mut self) {
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    let Some((pid, exit)) = ChildExit::from_wait_status(status) else {
                        continue;
                    };
                    if self.child.exited(pid) {
                        self.on_exit(pid, exit);
                    } else {
                        debug!(%pid, %exit, "reaped unrelated process");
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    warn!(error = %e, "waitpid failed");
                    break;
                }
            }
        }
    }

    fn on_exit(&mut self, pid: Pid, exit: ChildExit) {
        alarm::cancel();
        match self.child.state() {
            LifecycleState::Terminated => info!(%pid, %exit, "child stopped"),
            _ if exit.is_success() => info!(%pid, %exit, "child exited, restarting"),
            _ => warn!(%pid, %exit, "child failed, restarting"),
        }
    }

    fn handle_signals(&mut self, events: SignalEvents) {
        if events.terminate || events.interrupt {
            info!(terminate = events.terminate, interrupt = events.interrupt,
                  "stop signal received");
            let action = self.child.signal_stop();
            self.control.shutdown_listener();
            self.apply(action);
        }
        if events.alarm {
            let action = self.child.timed_out();
            if action != Action::Nothing {
                warn!(timeout = ?self.config.child_timeout,
                      "child did not stop in time");
            }
            self.apply(action);
        }
    }

    fn poll_control(&mut self) {
        match self.control.poll_accept() {
            Ok(true) => {
                info!("stop requested over the control socket");
                self.control.shutdown_listener();
                let action = self.child.request_stop();
                self.apply(action);
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "accept failed");
                self.retry_pause();
            }
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Nothing => {}
            Action::Terminate(pid) => {
                info!(%pid, "terminating child");
                self.signal(pid, Signal::SIGTERM);
                alarm::set(self.config.timeout_secs());
            }
            Action::Kill(pid) => {
                warn!(%pid, "killing child");
                self.signal(pid, Signal::SIGKILL);
            }
        }
    }

    fn signal(&self, pid: Pid, sig: Signal) {
        if let Err(e) = kill(pid, sig) {
            // The exit will still be reaped if it already happened
            warn!(%pid, signal = %sig, error = %e, "could not signal child");
        }
    }

    fn relaunch(&mut self) {
        let slept = self.bucket.acquire();
        if !slept.is_zero() {
            debug!(?slept, "restart rate limited");
        }
        if let Err(e) = self.launch() {
            error!(error = %e, "relaunch failed, will retry");
            self.retry_pause();
        }
    }

    fn launch(&mut self) -> Result<()> {
        info!(program = %self.launcher.program(), "launching child");
        let pid = self.launcher.launch(self.control.listener_fd())?;
        if let Some(stale) = self.child.launched(pid) {
            warn!(%stale, "launched over an instance that was never reaped");
        }
        debug!(%pid, "child running");
        Ok(())
    }

    fn retry_pause(&self) {
        thread::sleep(self.config.retry_interval);
    }

    fn finish(self) {
        alarm::cancel();
        let confirmed = self.control.has_connection();
        self.control.complete();
        info!(confirmed, "supervisor exiting");
    }
}
