//! Error types for configuration, process launch and the running pipeline.

use std::io;

use thiserror::Error;

/// Bad command line or cache configuration. Reported before any I/O begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid column `{token}` in key spec `{spec}`: expected an integer")]
    InvalidColumn { spec: String, token: String },
    #[error("field separator must not be empty")]
    EmptySeparator,
    #[error("flush rate must be at least 1 line")]
    ZeroFlushRate,
    #[error("no program to wrap: pass it after `--`")]
    MissingProgram,
}

/// The wrapped program could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("wrapped program has no {0} pipe")]
    MissingPipe(&'static str),
}

/// Fatal error while lines are flowing through the cache.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reading input: {0}")]
    Input(#[source] io::Error),
    #[error("writing output: {0}")]
    Output(#[source] io::Error),
    #[error("writing to wrapped program: {0}")]
    ChildInput(#[source] io::Error),
    #[error("reading from wrapped program: {0}")]
    ChildOutput(#[source] io::Error),
    #[error("wrapped program closed its output after {written} lines with input still pending")]
    ChildOutputClosed { written: u64 },
    #[error("work queue closed before end of input")]
    QueueClosed,
    #[error("input thread panicked")]
    InputPanicked,
    #[error("failed to spawn input thread: {0}")]
    SpawnThread(#[source] io::Error),
    #[error("waiting for wrapped program: {0}")]
    Wait(#[source] io::Error),
}

/// Top-level error returned by [`crate::run`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
