//! The response sink producer code writes to.
//!
//! # Responsibilities
//! - Hold response state: status, status message, headers, finished flag
//! - Enforce the headers-open → headers-sent transition on first body byte
//! - Route writes: direct to the transport, or through an interception point
//!
//! # Design Decisions
//! - Interception swaps an internal write route instead of mutating shared
//!   method tables; the host presents this wrapper to producer code
//! - The route swap is synchronous and indivisible: no producer write can
//!   bypass an armed interception, even on the same turn of execution

pub mod transport;

use bytes::Bytes;
use http::header::{AsHeaderName, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::error::{HijackError, HijackResult};
use crate::intercept::queue::PendingWriteQueue;
use crate::session::shadow::{shadow_channel, ShadowHandle, ShadowReadable};
use self::transport::{TransportFrame, TransportHandle};

/// Where producer writes currently go.
pub(crate) enum WriteRoute {
    /// Straight to the transport: no interception.
    Direct,
    /// Interception armed, session not yet active: writes queue up.
    Installing(PendingWriteQueue),
    /// Session active: writes land in the shadow channel.
    Intercepted(ShadowHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Direct,
    Installing,
    Intercepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    /// Headers may still be mutated.
    Open,
    /// The head frame went out; headers and status are locked.
    Sent,
}

struct SinkInner {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    head_state: HeadState,
    /// The interception snapshot is committed; producer-facing mutation is
    /// locked, matching the direct path's lock on first write.
    meta_committed: bool,
    /// The real `End` frame went to the transport.
    finished: bool,
    route: WriteRoute,
    transport: TransportHandle,
}

impl SinkInner {
    fn route_kind(&self) -> RouteKind {
        match self.route {
            WriteRoute::Direct => RouteKind::Direct,
            WriteRoute::Installing(_) => RouteKind::Installing,
            WriteRoute::Intercepted(_) => RouteKind::Intercepted,
        }
    }

    fn shadow(&self) -> ShadowHandle {
        match &self.route {
            WriteRoute::Intercepted(shadow) => shadow.clone(),
            _ => unreachable!("shadow() called outside the intercepted route"),
        }
    }

    fn send_head(&mut self) -> HijackResult<()> {
        if self.head_state == HeadState::Sent {
            return Ok(());
        }
        self.transport.send(TransportFrame::Head {
            status: self.status,
            reason: self.reason.clone(),
            headers: self.headers.clone(),
        })?;
        self.head_state = HeadState::Sent;
        Ok(())
    }

    fn capture_shadow_meta(&mut self) {
        self.shadow()
            .capture_meta(self.status, self.reason.clone(), &self.headers);
        self.meta_committed = true;
    }

    fn meta_locked(&self) -> bool {
        self.head_state == HeadState::Sent || self.meta_committed
    }
}

/// A response sink: the producer-facing single-writer, append-only view of an
/// outbound response. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResponseSink {
    inner: Arc<Mutex<SinkInner>>,
}

impl ResponseSink {
    /// Wrap the writing half of a transport channel.
    pub fn new(transport: TransportHandle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkInner {
                status: StatusCode::OK,
                reason: None,
                headers: HeaderMap::new(),
                head_state: HeadState::Open,
                meta_committed: false,
                finished: false,
                route: WriteRoute::Direct,
                transport,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap()
    }

    /// Set a response header. Fails once the head has been committed, either
    /// sent on the wire or locked into an interception snapshot.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.meta_locked() {
            return Err(HijackError::HeadersSent);
        }
        inner.headers.insert(name, value);
        Ok(())
    }

    /// Get a response header.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    /// Remove a response header. Fails once the head has been committed.
    pub fn remove_header<K: AsHeaderName>(&self, name: K) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.meta_locked() {
            return Err(HijackError::HeadersSent);
        }
        inner.headers.remove(name);
        Ok(())
    }

    /// Snapshot of the current header map.
    pub fn headers(&self) -> HeaderMap {
        self.lock().headers.clone()
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    /// Set the status code. Fails once the head has been committed.
    pub fn set_status(&self, status: StatusCode) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.meta_locked() {
            return Err(HijackError::HeadersSent);
        }
        inner.status = status;
        Ok(())
    }

    /// Custom reason phrase, if one was set.
    pub fn status_message(&self) -> Option<String> {
        self.lock().reason.clone()
    }

    /// Set a custom reason phrase. Fails once the head has been committed.
    pub fn set_status_message(&self, message: impl Into<String>) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.meta_locked() {
            return Err(HijackError::HeadersSent);
        }
        inner.reason = Some(message.into());
        Ok(())
    }

    /// Explicitly flush the response head (the `writeHead` analog).
    ///
    /// On the direct route this sends the head frame; under interception it
    /// locks the shadow metadata snapshot instead, so the real head stays
    /// unsent until the replacement path writes.
    pub fn flush_head(&self) -> HijackResult<()> {
        let mut inner = self.lock();
        match inner.route_kind() {
            RouteKind::Direct => inner.send_head(),
            RouteKind::Installing => {
                if let WriteRoute::Installing(queue) = &mut inner.route {
                    queue.flush_head();
                }
                inner.meta_committed = true;
                Ok(())
            }
            RouteKind::Intercepted => {
                inner.capture_shadow_meta();
                Ok(())
            }
        }
    }

    /// Write a body chunk.
    ///
    /// Returns `Ok(true)` if the producer may keep writing, `Ok(false)` if it
    /// should wait for [`drained`](Self::drained). Under interception the
    /// signal reflects the shadow buffer, not the real transport.
    pub fn write(&self, chunk: impl Into<Bytes>) -> HijackResult<bool> {
        let chunk = chunk.into();
        let mut inner = self.lock();
        match inner.route_kind() {
            RouteKind::Direct => {
                if inner.finished {
                    return Err(HijackError::WriteAfterEnd);
                }
                inner.send_head()?;
                inner.transport.send(TransportFrame::Body(chunk))
            }
            RouteKind::Installing => {
                if let WriteRoute::Installing(queue) = &mut inner.route {
                    queue.push(chunk)?;
                }
                inner.meta_committed = true;
                Ok(true)
            }
            RouteKind::Intercepted => {
                inner.capture_shadow_meta();
                inner.shadow().push(chunk)
            }
        }
    }

    /// End the response, optionally writing a final chunk first.
    ///
    /// A zero-length final chunk is preserved, not dropped.
    pub fn end(&self, chunk: Option<Bytes>) -> HijackResult<()> {
        let mut inner = self.lock();
        match inner.route_kind() {
            RouteKind::Direct => {
                if inner.finished {
                    return Err(HijackError::WriteAfterEnd);
                }
                inner.send_head()?;
                if let Some(chunk) = chunk {
                    inner.transport.send(TransportFrame::Body(chunk))?;
                }
                inner.transport.send(TransportFrame::End)?;
                inner.finished = true;
                Ok(())
            }
            RouteKind::Installing => {
                if let WriteRoute::Installing(queue) = &mut inner.route {
                    if let Some(chunk) = chunk {
                        queue.push(chunk)?;
                    }
                    queue.finish()?;
                }
                inner.meta_committed = true;
                Ok(())
            }
            RouteKind::Intercepted => {
                inner.capture_shadow_meta();
                let shadow = inner.shadow();
                if let Some(chunk) = chunk {
                    shadow.push(chunk)?;
                }
                shadow.finish()
            }
        }
    }

    /// Whether the producer's response has ended, through whichever route was
    /// live at the time.
    pub fn finished(&self) -> bool {
        let inner = self.lock();
        if inner.finished {
            return true;
        }
        match &inner.route {
            WriteRoute::Direct => false,
            WriteRoute::Installing(queue) => queue.ended(),
            WriteRoute::Intercepted(shadow) => shadow.is_ended(),
        }
    }

    /// Wait until the route accepting this sink's writes is ready for more.
    pub async fn drained(&self) {
        enum Target {
            Shadow(ShadowHandle),
            Transport(TransportHandle),
        }
        let target = {
            let inner = self.lock();
            match &inner.route {
                WriteRoute::Intercepted(shadow) => Target::Shadow(shadow.clone()),
                _ => Target::Transport(inner.transport.clone()),
            }
        };
        match target {
            Target::Shadow(shadow) => shadow.drained().await,
            Target::Transport(transport) => transport.drained().await,
        }
    }

    // --- interception seam, used by the controller and the session ---

    /// Swap the write route to the pending queue. Synchronous: once this
    /// returns, no producer write can reach the transport.
    pub(crate) fn arm_interception(&self) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.finished {
            return Err(HijackError::SinkAlreadyFinished);
        }
        match &inner.route {
            WriteRoute::Direct => {}
            WriteRoute::Installing(_) | WriteRoute::Intercepted(_) => {
                return Err(HijackError::DoubleHijack)
            }
        }
        inner.route = WriteRoute::Installing(PendingWriteQueue::new());
        Ok(())
    }

    /// Replace the pending queue with a live shadow channel, replaying queued
    /// writes in arrival order. Replay pushes into the buffer directly and
    /// never re-enters the intercepting write path.
    pub(crate) fn activate_interception(
        &self,
        high_water_mark: usize,
    ) -> HijackResult<(ShadowHandle, ShadowReadable)> {
        let mut inner = self.lock();
        let route = std::mem::replace(&mut inner.route, WriteRoute::Direct);
        let queue = match route {
            WriteRoute::Installing(queue) => queue,
            other => {
                inner.route = other;
                return Err(HijackError::DoubleHijack);
            }
        };
        let (handle, readable) = shadow_channel(high_water_mark);
        let (chunks, ended, head_flushed) = queue.into_parts();
        if head_flushed || ended || !chunks.is_empty() {
            handle.capture_meta(inner.status, inner.reason.clone(), &inner.headers);
        }
        for chunk in chunks {
            handle.push(chunk)?;
        }
        if ended {
            handle.finish()?;
        }
        inner.route = WriteRoute::Intercepted(handle.clone());
        Ok((handle, readable))
    }

    /// Restore direct routing: the next producer write goes straight to the
    /// transport, untouched. The snapshot lock dies with the session; only
    /// an actually-sent head keeps metadata frozen.
    pub(crate) fn restore_direct(&self) {
        let mut inner = self.lock();
        inner.route = WriteRoute::Direct;
        inner.meta_committed = false;
    }

    /// The original header binding: subject only to the head-sent lock, not
    /// the snapshot lock, so the replacement path can reshape the head.
    pub(crate) fn raw_set_header(&self, name: HeaderName, value: HeaderValue) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.head_state == HeadState::Sent {
            return Err(HijackError::HeadersSent);
        }
        inner.headers.insert(name, value);
        Ok(())
    }

    /// The original status binding, subject only to the head-sent lock.
    pub(crate) fn raw_set_status(&self, status: StatusCode) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.head_state == HeadState::Sent {
            return Err(HijackError::HeadersSent);
        }
        inner.status = status;
        Ok(())
    }

    /// The original reason-phrase binding, subject only to the head-sent lock.
    pub(crate) fn raw_set_status_message(&self, message: impl Into<String>) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.head_state == HeadState::Sent {
            return Err(HijackError::HeadersSent);
        }
        inner.reason = Some(message.into());
        Ok(())
    }

    /// The original write binding, bypassing whatever route is installed.
    pub(crate) fn raw_write(&self, chunk: Bytes) -> HijackResult<bool> {
        let mut inner = self.lock();
        if inner.finished {
            return Err(HijackError::WriteAfterEnd);
        }
        inner.send_head()?;
        inner.transport.send(TransportFrame::Body(chunk))
    }

    /// The original end binding, bypassing whatever route is installed.
    pub(crate) fn raw_end(&self, chunk: Option<Bytes>) -> HijackResult<()> {
        let mut inner = self.lock();
        if inner.finished {
            return Err(HijackError::WriteAfterEnd);
        }
        inner.send_head()?;
        if let Some(chunk) = chunk {
            inner.transport.send(TransportFrame::Body(chunk))?;
        }
        inner.transport.send(TransportFrame::End)?;
        inner.finished = true;
        Ok(())
    }

    /// Whether the real `End` frame already went to the transport.
    pub(crate) fn raw_finished(&self) -> bool {
        self.lock().finished
    }

    pub(crate) fn transport_closed_signal(&self) -> watch::Receiver<bool> {
        self.lock().transport.closed_signal()
    }

    pub(crate) async fn transport_drained(&self) {
        let transport = self.lock().transport.clone();
        transport.drained().await;
    }
}
