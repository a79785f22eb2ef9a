use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use linecache::{ChildExit, Options};

fn main() -> ExitCode {
    let options = Options::parse();
    linecache::init_tracing(options.log_json);

    match linecache::run(&options) {
        Ok(report) => {
            if let ChildExit::Signaled(signal) = report.exit {
                error!(
                    status = report.exit.code(),
                    ?signal,
                    "wrapped program terminated abnormally"
                );
            }
            ExitCode::from(report.exit.shell_status())
        }
        Err(e) => {
            eprintln!("linecache: {e}");
            ExitCode::FAILURE
        }
    }
}
