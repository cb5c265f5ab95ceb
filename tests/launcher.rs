use std::ffi::OsString;
use std::io;
use std::os::unix::io::RawFd;

use nix::sys::signal::{pthread_sigmask, SigmaskHow, Signal, SigSet};
use nix::sys::wait::waitpid;

use escort::launch::{ChildExit, Launcher};
use escort::{ControlChannel, Error};

fn command(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

#[test]
fn launch_and_reap() {
    let launcher = Launcher::new(&command(&["sh", "-c", "exit 7"]));
    assert_eq!(launcher.program(), "sh");
    let pid = launcher.launch(None).unwrap();
    let status = waitpid(pid, None).unwrap();
    assert_eq!(ChildExit::from_wait_status(status),
               Some((pid, ChildExit::Exited(7))));
}

#[test]
fn missing_program_is_a_launch_error() {
    let launcher = Launcher::new(&command(&["/nonexistent/escort-test-binary"]));
    match launcher.launch(None) {
        Err(Error::Launch { program, source }) => {
            assert_eq!(program, "/nonexistent/escort-test-binary");
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// Run `script` under `sh -c` with SIGTERM blocked in the caller and report
/// how it ended.
#[cfg(target_os = "linux")]
fn run_script(script: &str, listener: Option<RawFd>) -> ChildExit {
    let mut blocked = SigSet::empty();
    blocked.add(Signal::SIGTERM);
    let mut old = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut old)).unwrap();
    let launcher = Launcher::new(&command(&["sh", "-c", script]));
    let pid = launcher.launch(listener);
    pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&old), None).unwrap();

    let pid = pid.unwrap();
    let (reaped, exit) = ChildExit::from_wait_status(waitpid(pid, None).unwrap()).unwrap();
    assert_eq!(reaped, pid);
    exit
}

#[test]
#[cfg(target_os = "linux")]
fn child_does_not_inherit_blocked_signals_or_listener() {
    let dir = tempfile::tempdir().unwrap();
    // Bound the way the supervisor does it: no close-on-exec
    let channel = ControlChannel::bind(&dir.path().join("ctl.sock")).unwrap();
    let fd = channel.listener_fd().unwrap();

    // SigBlk in /proc is the blocked mask, SIGTERM is bit 15
    let script = format!(
        "test ! -e /proc/self/fd/{fd} || exit 3; \
         mask=$(grep SigBlk /proc/self/status | tr -d '\\t' | cut -d: -f2); \
         [ $((0x$mask & 0x4000)) -eq 0 ] || exit 4",
        fd = fd);
    assert_eq!(run_script(&script, Some(fd)), ChildExit::Exited(0));
}

#[test]
#[cfg(target_os = "linux")]
fn listener_survives_exec_unless_passed_to_launch() {
    let dir = tempfile::tempdir().unwrap();
    let channel = ControlChannel::bind(&dir.path().join("ctl.sock")).unwrap();
    let fd = channel.listener_fd().unwrap();

    let script = format!("test -e /proc/self/fd/{fd} || exit 3", fd = fd);
    assert_eq!(run_script(&script, None), ChildExit::Exited(0));
}
