//! The control socket
//!
//! A stream socket bound to a path, with a backlog of one. The protocol is
//! the connection itself: a client connects, sends nothing, and waits. The
//! supervisor takes that as "stop the child", stops listening (the path is
//! removed, so further clients get refused), and once the child is gone
//! writes a single byte and closes the connection.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::fs;

use nix::sys::socket::{bind, listen, socket, Backlog};
use nix::sys::socket::{AddressFamily, SockFlag, SockType, UnixAddr};

use crate::config::check_socket_path;
use crate::error::{socket_err, Result};

/// Byte written to the client once the child has exited
pub const SENTINEL: u8 = 0;

/// Server side of the control socket
///
/// Dropping the channel closes the listener and removes the path.
#[derive(Debug)]
pub struct ControlChannel {
    path: PathBuf,
    bound: bool,
    listener: Option<UnixListener>,
    connection: Option<UnixStream>,
}

impl ControlChannel {
    /// Bind and listen at `path`. The listener is non-blocking.
    pub fn bind(path: &Path) -> Result<ControlChannel> {
        check_socket_path(path)?;
        let fd = socket(AddressFamily::Unix, SockType::Stream,
                        SockFlag::empty(), None)
            .map_err(|e| socket_err(path, e))?;
        let addr = UnixAddr::new(path).map_err(|e| socket_err(path, e))?;
        bind(fd.as_raw_fd(), &addr).map_err(|e| socket_err(path, e))?;
        // From here on the path is ours to remove
        let mut channel = ControlChannel {
            path: path.to_path_buf(),
            bound: true,
            listener: None,
            connection: None,
        };
        let backlog = Backlog::new(1).map_err(|e| socket_err(path, e))?;
        listen(&fd, backlog).map_err(|e| socket_err(path, e))?;
        let listener = UnixListener::from(fd);
        listener.set_nonblocking(true).map_err(|e| socket_err(path, e))?;
        channel.listener = Some(listener);
        Ok(channel)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptor to wait on, or `None` once the channel stopped listening.
    pub fn listener_fd(&self) -> Option<RawFd> {
        self.listener.as_ref().map(|l| l.as_raw_fd())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Accept a pending stop request, if there is one.
    ///
    /// Returns `Ok(true)` when a connection was accepted. Only the first
    /// one is kept; the caller is expected to `shutdown_listener()` right
    /// after.
    pub fn poll_accept(&mut self) -> io::Result<bool> {
        let listener = match self.listener {
            Some(ref listener) => listener,
            None => return Ok(false),
        };
        match listener.accept() {
            Ok((stream, _)) => {
                if self.connection.is_none() {
                    self.connection = Some(stream);
                }
                Ok(true)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stop accepting requests: close the listener and unlink the path.
    pub fn shutdown_listener(&mut self) {
        self.listener = None;
        if !self.bound {
            return;
        }
        self.bound = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e,
                               "could not remove control socket");
            }
        }
    }

    /// Tell the waiting client (if any) that the child is gone, and close
    /// everything.
    pub fn complete(mut self) {
        self.shutdown_listener();
        if let Some(mut conn) = self.connection.take() {
            let res = conn.set_nonblocking(false)
                .and_then(|()| conn.write_all(&[SENTINEL]));
            if let Err(e) = res {
                // The client treats a bare close the same way
                tracing::debug!(error = %e, "could not confirm stop");
            }
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.shutdown_listener();
    }
}

/// How the supervisor answered a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAck {
    /// The sentinel byte arrived
    Confirmed,
    /// The connection ended without it
    Closed,
}

/// Client side: ask the supervisor at `path` to stop and wait until it
/// did. Any outcome of the wait counts as done.
pub fn request_stop(path: &Path) -> Result<StopAck> {
    check_socket_path(path)?;
    let mut stream = UnixStream::connect(path).map_err(|e| socket_err(path, e))?;
    let mut byte = [0u8; 1];
    let ack = loop {
        match stream.read(&mut byte) {
            Ok(1) => break StopAck::Confirmed,
            Ok(_) => break StopAck::Closed,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "stop wait ended with an error");
                break StopAck::Closed;
            }
        }
    };
    Ok(ack)
}
