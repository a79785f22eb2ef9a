//! linecache: transparent deduplicating cache around a line-oriented program.
//! Only the first line for each key reaches the wrapped program; repeats are
//! answered from cache. Output order always matches input order.

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod pipeline;
pub mod process;
pub mod queue;

use std::io::{self, BufReader};

use tracing::{debug, info};

pub use config::{CacheConfig, Options};
pub use error::{ConfigError, Error, LaunchError, PipelineError};
pub use pipeline::RunReport;
pub use process::{ChildExit, ABNORMAL_EXIT};

/// Stdin read buffer size.
const INPUT_BUFFER: usize = 64 * 1024;

/// Install the global tracing subscriber. Logs go to stderr; stdout carries data.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("linecache=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the cache around the program named in `options`, over this
/// process's stdin and stdout.
pub fn run(options: &Options) -> Result<RunReport, Error> {
    let config = options.cache_config()?;
    let argv = options.wrapped_argv()?;
    debug!(?config, ?argv, "configuration");
    info!(
        program = %options.program().map(|p| p.to_string_lossy()).unwrap_or_default(),
        key = ?config.key,
        "linecache starting"
    );

    let input = BufReader::with_capacity(INPUT_BUFFER, io::stdin());
    let output = io::stdout().lock();
    let report = pipeline::run(&config, argv, input, output)?;

    if options.stats {
        match serde_json::to_string(&report.stats) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => tracing::warn!(error = %e, "stats serialization failed"),
        }
    }
    Ok(report)
}
