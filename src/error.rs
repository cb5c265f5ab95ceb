use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Rejected launch settings. All of these are reported before anything is
/// bound or spawned, and map to an `EINVAL` exit status.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no command to supervise")]
    EmptyCommand,

    #[error("\"{path}\" too long ({len} bytes, must be under {max})")]
    SocketPathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    #[error("restart cost must be greater than zero")]
    ZeroCost,

    #[error("child timeout must be at least one second")]
    TimeoutTooShort,
}

/// Error surface for the supervisor and the stop client.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Signal {
        context: &'static str,
        #[source]
        source: Errno,
    },

    #[error("control socket {path}: {source}")]
    Socket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("detaching failed: {0}")]
    Detach(#[source] Errno),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Process exit status for a failure that ends the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => libc::EINVAL,
            _ => 1,
        }
    }
}

pub(crate) fn sys_err(context: &'static str, source: Errno) -> Error {
    Error::Signal { context, source }
}

pub(crate) fn socket_err(path: impl Into<PathBuf>, source: impl Into<io::Error>) -> Error {
    Error::Socket {
        path: path.into(),
        source: source.into(),
    }
}
