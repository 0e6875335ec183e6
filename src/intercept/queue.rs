//! Pending write queue.
//!
//! Captures producer writes that land between the moment interception is
//! armed and the moment the session becomes active. Arrival order is
//! preserved; activation replays the queue into the shadow buffer before any
//! later write.

use bytes::Bytes;

use crate::error::{HijackError, HijackResult};

#[derive(Debug, Default)]
pub(crate) struct PendingWriteQueue {
    chunks: Vec<Bytes>,
    ended: bool,
    head_flushed: bool,
}

impl PendingWriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk in arrival order.
    pub(crate) fn push(&mut self, chunk: Bytes) -> HijackResult<()> {
        if self.ended {
            return Err(HijackError::WriteAfterEnd);
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Record that the producer ended while interception was still installing.
    pub(crate) fn finish(&mut self) -> HijackResult<()> {
        if self.ended {
            return Err(HijackError::WriteAfterEnd);
        }
        self.ended = true;
        Ok(())
    }

    /// Record an explicit head flush issued before activation.
    pub(crate) fn flush_head(&mut self) {
        self.head_flushed = true;
    }

    pub(crate) fn ended(&self) -> bool {
        self.ended
    }

    /// Consume the queue for replay: `(chunks, ended, head_flushed)`.
    pub(crate) fn into_parts(self) -> (Vec<Bytes>, bool, bool) {
        (self.chunks, self.ended, self.head_flushed)
    }
}
