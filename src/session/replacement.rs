//! Replacement writable: the sole path to the real transport while a hijack
//! session is active.
//!
//! Writing here does exactly what the sink's original bindings would have
//! done absent interception: sends the head on the first byte, streams body
//! chunks, and finalizes the response on end.

use bytes::Bytes;
use http::header::{AsHeaderName, HeaderName, HeaderValue};
use http::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{HijackError, HijackResult};
use crate::sink::ResponseSink;

pub struct ReplacementWritable {
    sink: ResponseSink,
    /// Set by `end`, and by the session on restore: a restored session holds
    /// no further write authority.
    ended: Arc<AtomicBool>,
}

impl ReplacementWritable {
    pub(crate) fn new(sink: ResponseSink, ended: Arc<AtomicBool>) -> Self {
        Self { sink, ended }
    }

    /// Set a response header. Fails once the head has been sent. Unlike the
    /// producer-facing setter, this stays usable after the producer's first
    /// intercepted byte locked the snapshot.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) -> HijackResult<()> {
        self.sink.raw_set_header(name, value)
    }

    /// Get a response header.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.sink.header(name)
    }

    pub fn status(&self) -> StatusCode {
        self.sink.status()
    }

    /// Set the status code. Fails once the head has been sent.
    pub fn set_status(&self, status: StatusCode) -> HijackResult<()> {
        self.sink.raw_set_status(status)
    }

    pub fn status_message(&self) -> Option<String> {
        self.sink.status_message()
    }

    /// Set a custom reason phrase. Fails once the head has been sent.
    pub fn set_status_message(&self, message: impl Into<String>) -> HijackResult<()> {
        self.sink.raw_set_status_message(message)
    }

    /// Write a body chunk to the real transport.
    ///
    /// Returns `Ok(true)` while the transport accepts more data, `Ok(false)`
    /// when the writer should wait for [`drained`](Self::drained).
    pub fn write(&self, chunk: impl Into<Bytes>) -> HijackResult<bool> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(HijackError::WriteAfterEnd);
        }
        self.sink.raw_write(chunk.into())
    }

    /// Finalize the response, optionally writing a last chunk first.
    /// Ending twice fails with [`HijackError::WriteAfterEnd`].
    pub fn end(&self, chunk: Option<Bytes>) -> HijackResult<()> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return Err(HijackError::WriteAfterEnd);
        }
        self.sink.raw_end(chunk)
    }

    /// Write a chunk and wait out transport backpressure.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> HijackResult<()> {
        if !self.write(chunk)? {
            self.drained().await;
        }
        Ok(())
    }

    /// Wait until the transport drops below its high-water mark.
    pub async fn drained(&self) {
        self.sink.transport_drained().await;
    }

    /// Whether this writable has been ended or revoked.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}
