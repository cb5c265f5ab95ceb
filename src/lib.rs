//! Process supervision for a single child
//!
//! The library keeps one command alive, restarts it when it dies (no more
//! often than a leaky bucket allows) and stops it when asked through a
//! local control socket. Two binaries are built on it: `escort`, the
//! supervisor, and `escort-stop`, the client that asks it to stop.
//!
//! The pieces:
//!
//! 1. The `trap` module masks out signals and turns the four interesting
//!    ones (`SIGCHLD`, `SIGALRM`, `SIGTERM`, `SIGINT`) into counters, which
//!    are only looked at after an atomic unmask-and-wait returns
//! 2. The `control` module is the socket, server and client side
//! 3. `bucket` rate-limits launches, `launch` performs them
//! 4. `lifecycle` is the state machine and `supervisor` the loop driving it
//!
//! Everything runs on one thread. Unix only, tested on linux.

mod ffi;
pub mod bucket;
pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod launch;
pub mod lifecycle;
pub mod logging;
pub mod supervisor;
pub mod trap;

pub use config::{BucketConfig, SupervisorConfig};
pub use control::{request_stop, ControlChannel, StopAck};
pub use error::{ConfigError, Error, Result};
pub use supervisor::Supervisor;
