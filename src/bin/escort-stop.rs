//! escort-stop: ask an escort supervisor to stop its child and wait until
//! it has.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{debug, error};

use escort::logging::{self, LogConfig};
use escort::request_stop;

#[derive(Parser, Debug)]
#[command(
    name = "escort-stop",
    version,
    about = "Stop a command supervised by escort and wait for it to exit",
    long_about = None,
)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control socket of the supervisor
    socket: PathBuf,
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
        .with_env_overrides());
    let span = tracing::info_span!("escort-stop");
    let _enter = span.enter();

    match request_stop(&cli.socket) {
        Ok(ack) => debug!(?ack, "supervisor finished"),
        Err(err) => {
            error!("{}", err);
            process::exit(err.exit_code());
        }
    }
}
