//! Output pump: queue -> (wrapped program output on miss) -> stdout.

use std::io::{BufRead, BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::cache::pool::Pool;
use crate::error::PipelineError;
use crate::metrics::PipelineStats;
use crate::queue::{Consumer, QueueEntry};

/// Drains the queue in order, filling empty slots from the wrapped program.
/// Cached lines are copied into the borrowed pool, which outlives every slot.
pub struct OutputPump<'a, R, W: Write> {
    child_out: R,
    out: BufWriter<W>,
    pool: &'a Pool,
    consumer: Consumer<'a>,
    stats: Arc<PipelineStats>,
}

impl<'a, R: BufRead, W: Write> OutputPump<'a, R, W> {
    pub fn new(
        child_out: R,
        out: W,
        consumer: Consumer<'a>,
        pool: &'a Pool,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            child_out,
            out: BufWriter::new(out),
            pool,
            consumer,
            stats,
        }
    }

    /// Run until the end marker.
    pub fn run(mut self) -> Result<(), PipelineError> {
        let mut line = Vec::with_capacity(256);
        let mut written = 0u64;

        loop {
            let entry = match self.consumer.try_consume() {
                Some(entry) => entry,
                None => {
                    // Nothing ready: push out what we have before blocking.
                    self.out.flush().map_err(PipelineError::Output)?;
                    self.consumer.consume()?
                }
            };
            let slot = match entry {
                QueueEntry::Line(slot) => slot,
                QueueEntry::Done => break,
            };

            let cached = match slot.get() {
                Some(cached) => cached,
                None => {
                    line.clear();
                    let started = Instant::now();
                    let n = self
                        .child_out
                        .read_until(b'\n', &mut line)
                        .map_err(PipelineError::ChildOutput)?;
                    if n == 0 {
                        error!(written, "wrapped program closed its output early");
                        return Err(PipelineError::ChildOutputClosed { written });
                    }
                    if line.last() == Some(&b'\n') {
                        line.pop();
                    }
                    let copy = self.pool.allocate_and_copy(&line);
                    self.stats.record_child_line(started.elapsed(), line.len());
                    // Only this pump fills slots, and only empty ones.
                    let filled = slot.fill(copy);
                    debug_assert!(filled);
                    copy
                }
            };

            self.out
                .write_all(cached)
                .and_then(|_| self.out.write_all(b"\n"))
                .map_err(PipelineError::Output)?;
            written += 1;
            self.stats.record_written();
        }

        self.out.flush().map_err(PipelineError::Output)?;
        debug!(
            written,
            pool_bytes = self.pool.bytes_allocated(),
            "output drained"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DedupCache;
    use crate::queue::single_slot_queue;
    use std::io::Cursor;

    fn run_output(
        pool: &Pool,
        child_lines: &str,
        fingerprints: &[u64],
    ) -> (Result<(), PipelineError>, Vec<u8>) {
        let (producer, consumer) = single_slot_queue();
        let mut cache = DedupCache::new();
        for &fp in fingerprints {
            let (slot, _) = cache.lookup_or_insert(fp);
            producer.produce(slot).unwrap();
        }
        producer.finish().unwrap();

        let mut out = Vec::new();
        let stats = Arc::new(PipelineStats::new());
        let result = OutputPump::new(
            Cursor::new(child_lines.as_bytes().to_vec()),
            &mut out,
            consumer,
            pool,
            stats,
        )
        .run();
        (result, out)
    }

    #[test]
    fn replays_cached_output_for_repeats() {
        let pool = Pool::new();
        let (result, out) = run_output(&pool, "A\nB\n", &[1, 2, 1, 1, 2]);
        assert!(result.is_ok());
        assert_eq!(out, b"A\nB\nA\nA\nB\n");
    }

    #[test]
    fn child_line_without_newline_gets_one() {
        let pool = Pool::new();
        let (result, out) = run_output(&pool, "A", &[1, 1]);
        assert!(result.is_ok());
        assert_eq!(pool.bytes_allocated(), 1);
        assert_eq!(out, b"A\nA\n");
    }

    #[test]
    fn early_child_eof_is_fatal() {
        let pool = Pool::new();
        let (result, out) = run_output(&pool, "A\n", &[1, 2, 1]);
        assert!(matches!(
            result,
            Err(PipelineError::ChildOutputClosed { written: 1 })
        ));
        assert_eq!(out, b"A\n");
    }

    #[test]
    fn missing_end_marker_is_queue_closed() {
        let pool = Pool::new();
        let (producer, consumer) = single_slot_queue();
        drop(producer);
        let result = OutputPump::new(
            Cursor::new(Vec::new()),
            Vec::new(),
            consumer,
            &pool,
            Arc::new(PipelineStats::new()),
        )
        .run();
        assert!(matches!(result, Err(PipelineError::QueueClosed)));
    }
}
