//! Input pump: stdin -> fingerprint -> cache -> wrapped program + queue.

use std::io::{BufRead, BufWriter, Write};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::DedupCache;
use crate::config::CacheConfig;
use crate::error::PipelineError;
use crate::key::KeyExtractor;
use crate::metrics::PipelineStats;
use crate::queue::Producer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Streaming,
    Done,
}

/// Reads lines, forwards first-seen keys to the wrapped program and queues
/// a slot reference for every line.
pub struct InputPump<'a, R, W: Write> {
    reader: R,
    child_in: BufWriter<W>,
    extractor: KeyExtractor,
    flush_rate: usize,
    producer: Producer<'a>,
    stats: Arc<PipelineStats>,
    state: InputState,
}

impl<'a, R: BufRead, W: Write> InputPump<'a, R, W> {
    pub fn new(
        config: &CacheConfig,
        reader: R,
        child_in: W,
        producer: Producer<'a>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            reader,
            child_in: BufWriter::new(child_in),
            extractor: KeyExtractor::new(config.key.clone(), &config.separator),
            flush_rate: config.flush_rate.max(1),
            producer,
            stats,
            state: InputState::Streaming,
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    /// Run to end of input. Closes the child's stdin, then queues the end
    /// marker. The cache is borrowed so it outlives the pump.
    pub fn run(mut self, cache: &mut DedupCache<'a>) -> Result<(), PipelineError> {
        let mut line = Vec::with_capacity(256);
        let mut until_flush = self.flush_rate;

        while self.state == InputState::Streaming {
            line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(PipelineError::Input)?;
            if n == 0 {
                self.state = InputState::Done;
                break;
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }

            let fingerprint = self.extractor.fingerprint(&line);
            let (slot, is_new) = cache.lookup_or_insert(fingerprint);
            if is_new {
                self.child_in
                    .write_all(&line)
                    .and_then(|_| self.child_in.write_all(b"\n"))
                    .map_err(PipelineError::ChildInput)?;
                // Bound how much the child has to wait for.
                until_flush -= 1;
                if until_flush == 0 {
                    self.child_in.flush().map_err(PipelineError::ChildInput)?;
                    until_flush = self.flush_rate;
                }
            }
            self.stats.record_read(is_new);
            // Deadlock here if the wrapped program buffers more than the pipe holds.
            self.producer.produce(slot)?;
        }

        self.child_in.flush().map_err(PipelineError::ChildInput)?;
        drop(self.child_in);
        self.stats.set_distinct_keys(cache.len());
        info!(
            lines = self.stats.lines_read(),
            forwarded = self.stats.lines_forwarded(),
            distinct = cache.len(),
            "end of input, closed wrapped program stdin"
        );
        self.producer.finish()?;
        debug!("end marker queued");
        Ok(())
    }
}
