//! Stream partitioning of raw records into work units.

use std::sync::Arc;

use crate::error::{SourceError, SourceResult};
use crate::models::{RawRecord, WorkUnit};

/// Item produced by [`Batcher`].
#[derive(Debug)]
pub enum BatchEvent {
    /// A sealed unit, ready for extraction.
    Unit(WorkUnit),
    /// A row the reader could not parse; it belongs to no unit.
    Rejected(SourceError),
}

/// Groups non-blank records into units of `batch_size`, in arrival order.
///
/// Blank rows are dropped without taking a slot. The last unit holds the
/// remainder and may be smaller.
pub struct Batcher<I> {
    records: I,
    header: Arc<[String]>,
    batch_size: usize,
    buffer: Vec<RawRecord>,
    next_id: usize,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = SourceResult<RawRecord>>,
{
    /// `batch_size` is clamped to at least 1.
    pub fn new(records: I, header: Arc<[String]>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            records,
            header,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            next_id: 0,
        }
    }

    fn seal(&mut self) -> WorkUnit {
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let unit = WorkUnit {
            id: self.next_id,
            header: Arc::clone(&self.header),
            records,
        };
        self.next_id += 1;
        unit
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = SourceResult<RawRecord>>,
{
    type Item = BatchEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.records.next() {
                Some(Ok(record)) if record.is_blank() => continue,
                Some(Ok(record)) => {
                    self.buffer.push(record);
                    if self.buffer.len() >= self.batch_size {
                        return Some(BatchEvent::Unit(self.seal()));
                    }
                }
                Some(Err(e)) => return Some(BatchEvent::Rejected(e)),
                None if self.buffer.is_empty() => return None,
                None => return Some(BatchEvent::Unit(self.seal())),
            }
        }
    }
}
