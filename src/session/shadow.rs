//! Shadow channel: replay of everything the original producer tried to write.
//!
//! # Responsibilities
//! - Buffer intercepted chunks in producer order, end signal included
//! - Report backpressure to the producer via the buffer high-water mark
//! - Snapshot status/headers at the first intercepted byte
//! - Surface transport failure as a terminal error instead of hanging

use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, StatusCode};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tokio::sync::Notify;

use crate::error::{HijackError, HijackResult};

/// Response metadata captured when the producer committed its first body byte,
/// mirroring headers-lock-on-first-write semantics.
#[derive(Debug, Clone)]
pub struct ShadowMeta {
    pub status: StatusCode,
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

struct State {
    chunks: VecDeque<Bytes>,
    buffered_bytes: usize,
    ended: bool,
    failed: Option<HijackError>,
    failure_reported: bool,
    meta: Option<ShadowMeta>,
    read_waker: Option<Waker>,
}

struct Shared {
    state: Mutex<State>,
    drain_notify: Notify,
    high_water_mark: usize,
}

impl Shared {
    fn wake_reader(state: &mut State) {
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }
}

/// Producer-facing half, installed as the sink's write route while a session
/// is active.
#[derive(Clone)]
pub(crate) struct ShadowHandle {
    shared: Arc<Shared>,
}

/// Consumer-facing half: a single-consumer, finite, non-restartable sequence
/// of chunks followed by a terminal end signal.
pub struct ShadowReadable {
    shared: Arc<Shared>,
}

pub(crate) fn shadow_channel(high_water_mark: usize) -> (ShadowHandle, ShadowReadable) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            chunks: VecDeque::new(),
            buffered_bytes: 0,
            ended: false,
            failed: None,
            failure_reported: false,
            meta: None,
            read_waker: None,
        }),
        drain_notify: Notify::new(),
        high_water_mark: high_water_mark.max(1),
    });
    (
        ShadowHandle {
            shared: Arc::clone(&shared),
        },
        ShadowReadable { shared },
    )
}

impl ShadowHandle {
    /// Append an intercepted chunk. Returns `Ok(true)` while the buffer is
    /// below its high-water mark.
    pub(crate) fn push(&self, chunk: Bytes) -> HijackResult<bool> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(err) = &state.failed {
            return Err(err.clone());
        }
        if state.ended {
            return Err(HijackError::WriteAfterEnd);
        }
        state.buffered_bytes += chunk.len();
        state.chunks.push_back(chunk);
        let below = state.buffered_bytes < self.shared.high_water_mark;
        Shared::wake_reader(&mut state);
        Ok(below)
    }

    /// Record the end-of-stream signal from the producer.
    pub(crate) fn finish(&self) -> HijackResult<()> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(err) = &state.failed {
            return Err(err.clone());
        }
        if state.ended {
            return Err(HijackError::WriteAfterEnd);
        }
        state.ended = true;
        Shared::wake_reader(&mut state);
        Ok(())
    }

    /// Mark the channel failed. The reader observes the error once, then end
    /// of stream; producer writes fail with the same error. A cleanly ended
    /// channel stays ended: its data is complete.
    pub(crate) fn fail(&self, err: HijackError) {
        let mut state = self.shared.state.lock().unwrap();
        if state.ended {
            return;
        }
        if state.failed.is_none() {
            state.failed = Some(err);
        }
        Shared::wake_reader(&mut state);
        drop(state);
        self.shared.drain_notify.notify_waiters();
    }

    /// Snapshot response metadata. Only the first call takes effect.
    pub(crate) fn capture_meta(&self, status: StatusCode, reason: Option<String>, headers: &HeaderMap) {
        let mut state = self.shared.state.lock().unwrap();
        if state.meta.is_none() {
            state.meta = Some(ShadowMeta {
                status,
                reason,
                headers: headers.clone(),
            });
        }
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.shared.state.lock().unwrap().ended
    }

    /// Wait until the buffer drops below its high-water mark (or the channel
    /// fails; the next write reports the failure).
    pub(crate) async fn drained(&self) {
        loop {
            let notified = self.shared.drain_notify.notified();
            {
                let state = self.shared.state.lock().unwrap();
                if state.buffered_bytes < self.shared.high_water_mark || state.failed.is_some() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Take everything still buffered, terminating the readable.
    ///
    /// Used by the restore paths: flush-restore forwards the returned chunks
    /// to the transport, discard-restore drops them.
    pub(crate) fn drain_remaining(&self) -> (Vec<Bytes>, bool) {
        let mut state = self.shared.state.lock().unwrap();
        let chunks: Vec<Bytes> = state.chunks.drain(..).collect();
        state.buffered_bytes = 0;
        let ended = state.ended;
        state.ended = true;
        Shared::wake_reader(&mut state);
        drop(state);
        self.shared.drain_notify.notify_waiters();
        (chunks, ended)
    }
}

impl ShadowReadable {
    /// Poll for the next intercepted chunk.
    ///
    /// Buffered chunks are delivered before a terminal failure so that no
    /// observed byte is dropped; the failure itself is reported exactly once.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<HijackResult<Bytes>>> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(chunk) = state.chunks.pop_front() {
            state.buffered_bytes -= chunk.len();
            let below = state.buffered_bytes < self.shared.high_water_mark;
            drop(state);
            if below {
                self.shared.drain_notify.notify_waiters();
            }
            return Poll::Ready(Some(Ok(chunk)));
        }
        if let Some(err) = state.failed.clone() {
            if state.failure_reported {
                return Poll::Ready(None);
            }
            state.failure_reported = true;
            return Poll::Ready(Some(Err(err)));
        }
        if state.ended {
            return Poll::Ready(None);
        }
        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Receive the next chunk, or `None` once the producer ended.
    pub async fn recv(&mut self) -> Option<HijackResult<Bytes>> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// The status/headers the producer had committed at its first body byte.
    /// `None` until the first intercepted write, end, or head flush.
    pub fn meta(&self) -> Option<ShadowMeta> {
        self.shared.state.lock().unwrap().meta.clone()
    }
}

impl Stream for ShadowReadable {
    type Item = HijackResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}
