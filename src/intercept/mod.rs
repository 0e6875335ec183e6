//! Interception controller.
//!
//! # Responsibilities
//! - Arm interception on a response sink, synchronously and indivisibly
//! - Queue writes that race the asynchronous session handoff
//! - Activate the session: replay the queue, wire up transport-close
//!   propagation, hand out the session
//!
//! # Design Decisions
//! - Arming happens inside `hijack` itself, before the future is returned:
//!   a producer writing on the same turn of execution cannot bypass it
//! - Precondition failures (double hijack, finished sink) surface at the
//!   call site, through the future or callback, before any session exists
//! - Nested hijacking is rejected with `DoubleHijack`

pub(crate) mod queue;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::{HijackError, HijackResult};
use crate::session::{HijackSession, ReplacementWritable};
use crate::sink::ResponseSink;

/// Default shadow buffer high-water mark, in bytes.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Tunables for a hijack session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Shadow buffer size above which producer writes report backpressure.
    pub high_water_mark: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

/// Take over a response sink.
///
/// Interception is armed before this function returns: every producer write
/// from this point on is captured, queued until the returned future resolves
/// and redirected into the session's shadow-readable afterwards. Await the
/// future (on a tokio runtime) to get the [`HijackSession`].
pub fn hijack(sink: &ResponseSink) -> HijackFuture {
    hijack_with_options(sink, SessionOptions::default())
}

/// [`hijack`] with explicit tunables.
pub fn hijack_with_options(sink: &ResponseSink, options: SessionOptions) -> HijackFuture {
    let armed = sink.arm_interception();
    if armed.is_ok() {
        tracing::debug!("interception armed");
    }
    HijackFuture {
        sink: sink.clone(),
        options,
        armed: Some(armed),
    }
}

/// Callback-delivery form of [`hijack`], for hosts structured around direct
/// continuations rather than futures. The callback runs before this returns.
pub fn hijack_with<F>(sink: &ResponseSink, ready: F)
where
    F: FnOnce(HijackResult<HijackSession>),
{
    match sink.arm_interception() {
        Err(err) => ready(Err(err)),
        Ok(()) => {
            tracing::debug!("interception armed");
            ready(activate(sink, &SessionOptions::default()));
        }
    }
}

/// Resolves to the hijack session once queued writes have been replayed.
///
/// Interception is already armed when this future is handed out; dropping it
/// unpolled leaves the sink armed with its writes queuing.
#[must_use = "the sink is armed; poll the future to obtain the session"]
pub struct HijackFuture {
    sink: ResponseSink,
    options: SessionOptions,
    armed: Option<HijackResult<()>>,
}

impl Future for HijackFuture {
    type Output = HijackResult<HijackSession>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.armed.take() {
            None => Poll::Pending,
            Some(Err(err)) => Poll::Ready(Err(err)),
            Some(Ok(())) => Poll::Ready(activate(&this.sink, &this.options)),
        }
    }
}

/// Replay the pending queue into a fresh shadow channel, swap it in as the
/// sink's write route and build the session around it.
fn activate(sink: &ResponseSink, options: &SessionOptions) -> HijackResult<HijackSession> {
    let (shadow, readable) = sink.activate_interception(options.high_water_mark)?;

    // Surface a mid-session transport close on both halves instead of
    // letting consumers hang.
    let mut closed = sink.transport_closed_signal();
    let watcher_shadow = shadow.clone();
    let watcher = tokio::spawn(async move {
        if closed.wait_for(|closed| *closed).await.is_ok() {
            tracing::debug!("transport closed while session active");
            watcher_shadow.fail(HijackError::TransportClosed);
        }
    });

    let revoke = Arc::new(AtomicBool::new(false));
    let writable = ReplacementWritable::new(sink.clone(), Arc::clone(&revoke));
    tracing::debug!("hijack session active");
    Ok(HijackSession::new(
        readable,
        writable,
        sink.clone(),
        shadow,
        revoke,
        watcher,
    ))
}
