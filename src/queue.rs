//! Work queue between the input and output pumps.
//! One producer, one consumer, unbounded crossbeam channel: the producer
//! never waits on capacity, the consumer blocks until an entry arrives.
//! Entries come out in exactly the order they went in.

use crossbeam_channel as cb;

use crate::cache::SlotRef;
use crate::error::PipelineError;

/// One input line's position in the output, or end of input.
#[derive(Debug)]
pub enum QueueEntry<'a> {
    Line(SlotRef<'a>),
    Done,
}

pub struct Producer<'a> {
    tx: cb::Sender<QueueEntry<'a>>,
}

pub struct Consumer<'a> {
    rx: cb::Receiver<QueueEntry<'a>>,
}

/// Create the queue.
pub fn single_slot_queue<'a>() -> (Producer<'a>, Consumer<'a>) {
    let (tx, rx) = cb::unbounded();
    (Producer { tx }, Consumer { rx })
}

impl<'a> Producer<'a> {
    /// Push the slot for the next input line. Fails only if the consumer is gone.
    pub fn produce(&self, slot: SlotRef<'a>) -> Result<(), PipelineError> {
        self.tx
            .send(QueueEntry::Line(slot))
            .map_err(|_| PipelineError::QueueClosed)
    }

    /// Push the end-of-input marker. Consumes the producer.
    pub fn finish(self) -> Result<(), PipelineError> {
        self.tx
            .send(QueueEntry::Done)
            .map_err(|_| PipelineError::QueueClosed)
    }
}

impl<'a> Consumer<'a> {
    /// Block until the next entry. A producer dropped without
    /// [`Producer::finish`] yields `QueueClosed`.
    pub fn consume(&self) -> Result<QueueEntry<'a>, PipelineError> {
        self.rx.recv().map_err(|_| PipelineError::QueueClosed)
    }

    /// Next entry if one is ready now.
    pub fn try_consume(&self) -> Option<QueueEntry<'a>> {
        self.rx.try_recv().ok()
    }
}
