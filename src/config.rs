//! Tunable constants and validated launch settings
//!
//! The defaults are the values the supervisor uses when nothing else is
//! given on the command-line. Everything time-related is a `Duration` so
//! tests may use sub-second values, but the termination timeout has
//! whole-second granularity because it is driven by `alarm(2)`.

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Pause after a failed system call that is worth retrying.
pub const SLEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long a child has to honour `SIGTERM` before it gets `SIGKILL`.
pub const CHILD_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket paths must be strictly shorter than this. Smaller than
/// `sun_path` on every platform we care about.
pub const SOCK_PATHLEN: usize = 92;

/// Default size of the restart bucket.
pub const BUCKET_SIZE: Duration = Duration::from_secs(20);

/// Default price of a single (re)start.
pub const BUCKET_COST: Duration = Duration::from_secs(10);

/// Leaky bucket parameters. The two values are independent: `capacity`
/// bounds the burst, `cost` bounds the steady-state restart rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub capacity: Duration,
    pub cost: Duration,
}

impl Default for BucketConfig {
    fn default() -> BucketConfig {
        BucketConfig {
            capacity: BUCKET_SIZE,
            cost: BUCKET_COST,
        }
    }
}

/// Everything the supervisor needs to start.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub socket_path: PathBuf,
    pub command: Vec<OsString>,
    pub child_timeout: Duration,
    pub retry_interval: Duration,
    pub bucket: BucketConfig,
}

impl SupervisorConfig {
    pub fn new<P, I, A>(socket_path: P, command: I) -> SupervisorConfig
        where P: Into<PathBuf>,
              I: IntoIterator<Item=A>,
              A: Into<OsString>,
    {
        SupervisorConfig {
            socket_path: socket_path.into(),
            command: command.into_iter().map(Into::into).collect(),
            child_timeout: CHILD_TIMEOUT,
            retry_interval: SLEEP_INTERVAL,
            bucket: BucketConfig::default(),
        }
    }

    pub fn with_child_timeout(mut self, timeout: Duration) -> Self {
        self.child_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_bucket(mut self, bucket: BucketConfig) -> Self {
        self.bucket = bucket;
        self
    }

    /// Check the settings, returning them unchanged when they are usable.
    pub fn validate(self) -> Result<SupervisorConfig, ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        check_socket_path(&self.socket_path)?;
        if self.bucket.cost.is_zero() {
            return Err(ConfigError::ZeroCost);
        }
        if self.child_timeout < Duration::from_secs(1) {
            return Err(ConfigError::TimeoutTooShort);
        }
        Ok(self)
    }

    /// Termination timeout in whole seconds, rounded up, as `alarm(2)`
    /// wants it.
    pub fn timeout_secs(&self) -> u32 {
        let secs = self.child_timeout.as_secs()
            + u64::from(self.child_timeout.subsec_nanos() > 0);
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}

/// Reject socket paths that will not fit into a `sockaddr_un`.
pub fn check_socket_path(path: &Path) -> Result<(), ConfigError> {
    let len = path.as_os_str().as_bytes().len();
    if len >= SOCK_PATHLEN {
        return Err(ConfigError::SocketPathTooLong {
            path: path.to_path_buf(),
            len,
            max: SOCK_PATHLEN,
        });
    }
    Ok(())
}
