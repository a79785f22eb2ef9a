//! Pipeline wiring: wrapped program + input thread + output on the caller's thread.
//!
//! ```text
//! stdin -> InputPump -> { DedupCache, child stdin, queue }
//! child stdout -> OutputPump -> { Pool, slot fill, stdout }
//! ```
//!
//! Both pumps run inside one `std::thread::scope`: the input pump on a scoped
//! thread, the output pump on the calling thread. The pool and cache are owned
//! here and outlive the scope, so slots hold plain borrowed slices. A wrapped
//! program that reads far more input than the pipe holds before answering
//! stalls both sides; nothing here can break that.

pub mod input;
pub mod output;

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::pool::Pool;
use crate::cache::DedupCache;
use crate::config::CacheConfig;
use crate::error::{Error, PipelineError};
use crate::metrics::{PipelineStats, StatsSnapshot};
use crate::process::{ChildExit, ProcessHandle};
use crate::queue::single_slot_queue;
use input::InputPump;
use output::OutputPump;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub exit: ChildExit,
    pub stats: StatsSnapshot,
}

/// Launch `argv` and push every line of `input` through the cache to `output`.
///
/// On a fatal pipeline error the wrapped program is killed and reaped. The
/// input thread is always joined before this returns; after an output
/// failure it stops at its next write to the killed child or its next line.
pub fn run<R, W>(
    config: &CacheConfig,
    argv: &[OsString],
    input: R,
    output: W,
) -> Result<RunReport, Error>
where
    R: BufRead + Send,
    W: Write,
{
    let mut process = ProcessHandle::launch(argv)?;
    let child_in = process.take_stdin()?;
    let child_out = BufReader::new(process.take_stdout()?);

    let stats = Arc::new(PipelineStats::new());
    let pool = Pool::new();
    let mut cache = DedupCache::new();
    let (producer, consumer) = single_slot_queue();

    let input_pump = InputPump::new(config, input, child_in, producer, Arc::clone(&stats));
    let output_pump = OutputPump::new(child_out, output, consumer, &pool, Arc::clone(&stats));

    let outcome = std::thread::scope(|scope| {
        let cache = &mut cache;
        let spawned = std::thread::Builder::new()
            .name("linecache-input".into())
            .spawn_scoped(scope, move || input_pump.run(cache));
        let input_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => return Err(PipelineError::SpawnThread(e)),
        };

        match output_pump.run() {
            Ok(()) => input_thread
                .join()
                .unwrap_or(Err(PipelineError::InputPanicked)),
            Err(PipelineError::QueueClosed) => {
                // The input side stopped without an end marker; its error is the cause.
                let cause = match input_thread.join() {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => PipelineError::QueueClosed,
                    Err(_) => PipelineError::InputPanicked,
                };
                error!(error = %cause, "input side failed");
                Err(cause)
            }
            Err(e) => {
                error!(error = %e, "output side failed");
                // Closes the child's stdin pipe under a blocked input thread.
                process.kill();
                let _ = input_thread.join();
                Err(e)
            }
        }
    });
    if let Err(e) = outcome {
        process.kill();
        return Err(e.into());
    }

    let exit = process.wait()?;
    let snapshot = stats.snapshot();
    if snapshot.lines_written != snapshot.lines_read {
        warn!(
            read = snapshot.lines_read,
            written = snapshot.lines_written,
            "line count mismatch"
        );
    }
    info!(
        lines = snapshot.lines_read,
        distinct = cache.len(),
        hits = snapshot.cache_hits,
        pool_bytes = pool.bytes_allocated(),
        code = exit.code(),
        "pipeline finished"
    );
    Ok(RunReport {
        exit,
        stats: snapshot,
    })
}
