//! escort: keep a command running until asked to stop.
//!
//! ```text
//! escort [OPTIONS] <SOCKET> <COMMAND> [ARGS]...
//! escort-stop <SOCKET>
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use escort::config::{BUCKET_COST, BUCKET_SIZE, CHILD_TIMEOUT, SLEEP_INTERVAL};
use escort::daemon;
use escort::logging::{self, LogConfig, LogFormat};
use escort::{BucketConfig, Error, Supervisor, SupervisorConfig};

#[derive(Parser, Debug)]
#[command(
    name = "escort",
    version,
    about = "Keep a command running, restart it when it dies, stop it on request",
    long_about = None,
)]
struct Cli {
    /// Seconds the child gets to exit after SIGTERM before it is killed
    #[arg(long, value_name = "SECS", default_value_t = CHILD_TIMEOUT.as_secs())]
    timeout: u64,

    /// Seconds to wait before retrying a failed launch or system call
    #[arg(long, value_name = "SECS", default_value_t = SLEEP_INTERVAL.as_secs())]
    retry_interval: u64,

    /// Restart credit the bucket can hold, in seconds
    #[arg(long, value_name = "SECS", default_value_t = BUCKET_SIZE.as_secs())]
    bucket_capacity: u64,

    /// Credit one restart costs, in seconds
    #[arg(long, value_name = "SECS", default_value_t = BUCKET_COST.as_secs())]
    bucket_cost: u64,

    /// Run in the background, detached from the terminal
    #[arg(long)]
    detach: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format: pretty, compact or json
    #[arg(long, value_name = "FORMAT", default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Path of the control socket
    socket: PathBuf,

    /// Command to supervise, followed by its arguments
    #[arg(required = true, num_args = 1.., trailing_var_arg = true,
          allow_hyphen_values = true)]
    command: Vec<OsString>,
}

impl Cli {
    fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new(&self.socket, self.command.iter().cloned())
            .with_child_timeout(Duration::from_secs(self.timeout))
            .with_retry_interval(Duration::from_secs(self.retry_interval))
            .with_bucket(BucketConfig {
                capacity: Duration::from_secs(self.bucket_capacity),
                cost: Duration::from_secs(self.bucket_cost),
            })
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { libc::EINVAL } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    };

    logging::init(LogConfig::default()
        .with_level(logging::level_for_verbosity(cli.verbose))
        .with_format(cli.log_format)
        .with_env_overrides());
    let span = tracing::info_span!("escort");
    let _enter = span.enter();

    if let Err(err) = run(&cli) {
        error!("{}", err);
        process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    // Bad arguments are reported before going to the background
    let config = cli.supervisor_config().validate()?;
    if cli.detach {
        daemon::detach()?;
    }
    Supervisor::new(config)?.run()
}
