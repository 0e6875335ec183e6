//! Transport channel between a response sink and the real connection.
//!
//! # Responsibilities
//! - Carry head/body/end frames from the sink to the connection
//! - Surface write backpressure to the writer (byte high-water mark + drain)
//! - Signal remote close/reset back to the sink and any active session
//!
//! # Design Decisions
//! - The host adapts its real connection to [`TransportReceiver`]; the library
//!   never touches sockets itself
//! - Writes are accepted and buffered even past the high-water mark; the bool
//!   return value tells the writer to pause, it is never a hard rejection

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

use crate::error::{HijackError, HijackResult};

/// A frame travelling from the response sink to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFrame {
    /// Response head. Sent exactly once, before any body frame.
    Head {
        status: StatusCode,
        /// Custom reason phrase, if the producer set one.
        reason: Option<String>,
        headers: HeaderMap,
    },
    /// A body chunk. May be empty.
    Body(Bytes),
    /// End of the response.
    End,
}

struct QueueState {
    frames: VecDeque<TransportFrame>,
    buffered_bytes: usize,
    /// An `End` frame has been enqueued; no further frames are accepted.
    end_enqueued: bool,
    /// The `End` frame has been consumed by the receiver.
    end_delivered: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    recv_notify: Notify,
    drain_notify: Notify,
    closed_tx: watch::Sender<bool>,
    high_water_mark: usize,
}

impl Shared {
    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    fn close(&self) {
        let _ = self.closed_tx.send(true);
        self.recv_notify.notify_one();
        self.drain_notify.notify_waiters();
    }
}

/// Writing half: held by the [`ResponseSink`](crate::sink::ResponseSink).
#[derive(Clone)]
pub struct TransportHandle {
    shared: Arc<Shared>,
}

/// Receiving half: the host drains this into the real connection.
pub struct TransportReceiver {
    shared: Arc<Shared>,
}

/// Create a transport channel with the given byte high-water mark.
pub fn transport_channel(high_water_mark: usize) -> (TransportHandle, TransportReceiver) {
    let (closed_tx, _) = watch::channel(false);
    let shared = Arc::new(Shared {
        queue: Mutex::new(QueueState {
            frames: VecDeque::new(),
            buffered_bytes: 0,
            end_enqueued: false,
            end_delivered: false,
        }),
        recv_notify: Notify::new(),
        drain_notify: Notify::new(),
        closed_tx,
        high_water_mark: high_water_mark.max(1),
    });
    (
        TransportHandle {
            shared: Arc::clone(&shared),
        },
        TransportReceiver { shared },
    )
}

impl TransportHandle {
    /// Enqueue a frame for the connection.
    ///
    /// Returns `Ok(true)` if the writer may keep writing, `Ok(false)` if it
    /// should pause until [`drained`](Self::drained) resolves.
    pub fn send(&self, frame: TransportFrame) -> HijackResult<bool> {
        if self.shared.is_closed() {
            return Err(HijackError::TransportClosed);
        }
        let mut queue = self.shared.queue.lock().unwrap();
        if queue.end_enqueued {
            return Err(HijackError::WriteAfterEnd);
        }
        match &frame {
            TransportFrame::Body(chunk) => queue.buffered_bytes += chunk.len(),
            TransportFrame::End => queue.end_enqueued = true,
            TransportFrame::Head { .. } => {}
        }
        queue.frames.push_back(frame);
        let below = queue.buffered_bytes < self.shared.high_water_mark;
        drop(queue);
        self.shared.recv_notify.notify_one();
        Ok(below)
    }

    /// Whether the remote peer closed or reset the connection.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Subscribe to the close signal.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.shared.closed_tx.subscribe()
    }

    /// Wait until the buffered byte count drops below the high-water mark.
    ///
    /// Resolves immediately if the transport is not under pressure, and on
    /// close (the next write reports the failure).
    pub async fn drained(&self) {
        loop {
            let notified = self.shared.drain_notify.notified();
            {
                let queue = self.shared.queue.lock().unwrap();
                if queue.buffered_bytes < self.shared.high_water_mark || self.shared.is_closed() {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl TransportReceiver {
    /// Receive the next frame, or `None` once the response ended or the
    /// channel was closed.
    pub async fn recv(&mut self) -> Option<TransportFrame> {
        loop {
            let notified = self.shared.recv_notify.notified();
            {
                let mut queue = self.shared.queue.lock().unwrap();
                if let Some(frame) = queue.frames.pop_front() {
                    match &frame {
                        TransportFrame::Body(chunk) => {
                            queue.buffered_bytes -= chunk.len();
                            if queue.buffered_bytes < self.shared.high_water_mark {
                                self.shared.drain_notify.notify_waiters();
                            }
                        }
                        TransportFrame::End => queue.end_delivered = true,
                        TransportFrame::Head { .. } => {}
                    }
                    return Some(frame);
                }
                if queue.end_delivered || self.shared.is_closed() {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Simulate a close/reset by the remote peer. Pending writers wake up and
    /// subsequent writes fail with [`HijackError::TransportClosed`].
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for TransportReceiver {
    fn drop(&mut self) {
        self.shared.close();
    }
}
