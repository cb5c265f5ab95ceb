use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::ptr::{null, null_mut};
use std::time::Duration;

use libc::{self, timespec};
use nix::errno::Errno;
use nix::sys::signal::SigSet;


/// Wait until `fd` is readable, `timeout` expires or a signal arrives.
///
/// `mask` is installed as the thread's signal mask for the duration of the
/// call only; the swap and the wait are a single atomic step in the kernel.
/// With no descriptor and no timeout this is a `sigsuspend()` that also
/// accepts a mask.
///
/// Returns whether `fd` became readable. A delivered signal shows up as
/// `Err(Errno::EINTR)`.
pub fn pselect(fd: Option<RawFd>, timeout: Option<Duration>, mask: &SigSet)
    -> Result<bool, Errno>
{
    let tm = timeout.map(|timeout| timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    });
    let tm_ptr = tm.as_ref().map_or(null(), |tm| tm as *const timespec);
    unsafe {
        let mut fds = MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(fds.as_mut_ptr());
        let mut fds = fds.assume_init();
        let nfds = match fd {
            Some(fd) => {
                libc::FD_SET(fd, &mut fds);
                fd + 1
            }
            None => 0,
        };
        let res = libc::pselect(nfds, &mut fds, null_mut(), null_mut(),
                                tm_ptr, mask.as_ref());
        if res == -1 {
            return Err(Errno::last());
        }
        Ok(res > 0 && fd.map_or(false, |fd| libc::FD_ISSET(fd, &fds)))
    }
}
