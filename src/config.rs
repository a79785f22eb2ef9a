//! Command-line options.
//! `linecache [-k COLSPEC] [-t SEP] [--flush-rate N] [--stats] -- PROGRAM [ARGS...]`

use std::ffi::{OsStr, OsString};

use clap::Parser;

use crate::error::ConfigError;
use crate::key::KeySpec;

/// Lines written to the wrapped program between forced flushes.
pub const DEFAULT_FLUSH_RATE: usize = 4096;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "linecache",
    version,
    about = "Acts as a cache around another program processing one line in, one line out from stdin to stdout."
)]
pub struct Options {
    /// Column(s) to use as the deduplication key, 1-based and comma separated (default: whole line)
    #[arg(short = 'k', long = "key", value_name = "COLSPEC", allow_hyphen_values = true)]
    pub key: Option<String>,

    /// Field separator used to split columns
    #[arg(
        short = 't',
        long = "field_separator",
        visible_alias = "field-separator",
        value_name = "SEP",
        default_value = "\t"
    )]
    pub field_separator: String,

    /// Lines sent to the wrapped program between forced flushes
    #[arg(long = "flush-rate", value_name = "LINES", default_value_t = DEFAULT_FLUSH_RATE)]
    pub flush_rate: usize,

    /// Print pipeline statistics as JSON to stderr on exit
    #[arg(long)]
    pub stats: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Wrapped program and its arguments, after `--`
    #[arg(last = true, value_name = "PROGRAM")]
    pub command: Vec<OsString>,
}

/// Validated settings for the pumps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub key: KeySpec,
    pub separator: Vec<u8>,
    pub flush_rate: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key: KeySpec::WholeLine,
            separator: b"\t".to_vec(),
            flush_rate: DEFAULT_FLUSH_RATE,
        }
    }
}

impl Options {
    /// Check and convert the cache-related flags.
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let key = match &self.key {
            Some(spec) => spec.parse()?,
            None => KeySpec::WholeLine,
        };
        if self.field_separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        if self.flush_rate == 0 {
            return Err(ConfigError::ZeroFlushRate);
        }
        Ok(CacheConfig {
            key,
            separator: self.field_separator.as_bytes().to_vec(),
            flush_rate: self.flush_rate,
        })
    }

    /// The wrapped program's argv, verbatim.
    pub fn wrapped_argv(&self) -> Result<&[OsString], ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::MissingProgram);
        }
        Ok(&self.command)
    }

    pub fn program(&self) -> Option<&OsStr> {
        self.command.first().map(OsString::as_os_str)
    }
}
