//! Hijack session lifecycle.
//!
//! # Responsibilities
//! - Own the shadow-readable and replacement-writable halves
//! - Track the session state machine (installing → active → restoring →
//!   restored, with failed as the error terminal)
//! - Restore the sink's original behavior on unhijack, flushing or discarding
//!   whatever is still buffered in the shadow channel
//!
//! # Design Decisions
//! - `unhijack` is runtime-checked rather than consuming: a second call on a
//!   restored session fails with `InvalidSessionState` and mutates nothing
//! - Restoring revokes the replacement-writable; later writes on it fail

pub mod replacement;
pub mod shadow;

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::{HijackError, HijackResult};
use crate::sink::ResponseSink;

pub use self::replacement::ReplacementWritable;
pub use self::shadow::{ShadowMeta, ShadowReadable};

use self::shadow::ShadowHandle;

/// Lifecycle state of a hijack session.
///
/// `Active` is the only state from which `Restoring` is reachable; everything
/// except `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Interception is armed but queued writes have not been replayed yet.
    Installing,
    /// The session owns the sink's write path.
    Active,
    /// An unhijack is in progress.
    Restoring,
    /// Original behavior restored; the session holds no write authority.
    Restored,
    /// Setup or restore failed; the session holds no write authority.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Installing => "installing",
            SessionState::Active => "active",
            SessionState::Restoring => "restoring",
            SessionState::Restored => "restored",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How `unhijack` treats data still buffered in the shadow channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Deliver buffered chunks (and the end signal, if the producer ended)
    /// to the real transport before restoring.
    Flush,
    /// Drop buffered data and restore immediately.
    Discard,
}

/// A live hijack: everything the producer writes shows up on `readable`,
/// and `writable` is the only remaining path to the client.
pub struct HijackSession {
    pub readable: ShadowReadable,
    pub writable: ReplacementWritable,
    state: SessionState,
    sink: ResponseSink,
    shadow: ShadowHandle,
    revoke: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
}

impl HijackSession {
    pub(crate) fn new(
        readable: ShadowReadable,
        writable: ReplacementWritable,
        sink: ResponseSink,
        shadow: ShadowHandle,
        revoke: Arc<AtomicBool>,
        watcher: JoinHandle<()>,
    ) -> Self {
        Self {
            readable,
            writable,
            state: SessionState::Active,
            sink,
            shadow,
            revoke,
            watcher,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Restore the sink's original write/end behavior.
    ///
    /// With [`FlushMode::Flush`], shadow-buffered data is delivered to the
    /// transport first so nothing the producer wrote is lost. Only legal from
    /// the `active` state.
    pub fn unhijack(&mut self, mode: FlushMode) -> HijackResult<()> {
        self.begin_restore()?;
        let (chunks, ended) = self.shadow.drain_remaining();
        if mode == FlushMode::Flush {
            if let Err(err) = self.flush_buffered(chunks, ended) {
                self.state = SessionState::Failed;
                self.sink.restore_direct();
                return Err(err);
            }
        }
        self.sink.restore_direct();
        self.state = SessionState::Restored;
        tracing::debug!(mode = ?mode, "interception restored");
        Ok(())
    }

    /// Restore, discarding buffered shadow data, then hand the restored sink
    /// to `continuation` so the caller can produce output directly, e.g. to
    /// report an error through a normal continuation chain.
    pub fn unhijack_with<F>(&mut self, continuation: F) -> HijackResult<()>
    where
        F: FnOnce(&ResponseSink),
    {
        self.unhijack(FlushMode::Discard)?;
        continuation(&self.sink);
        Ok(())
    }

    /// Pump the shadow-readable into the replacement-writable unchanged,
    /// honoring transport backpressure, and finalize the response.
    pub async fn pipe_through(&mut self) -> HijackResult<()> {
        pipe(&mut self.readable, &self.writable).await
    }

    fn begin_restore(&mut self) -> HijackResult<()> {
        if self.state != SessionState::Active {
            return Err(HijackError::InvalidSessionState { actual: self.state });
        }
        self.state = SessionState::Restoring;
        self.watcher.abort();
        self.revoke.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn flush_buffered(&self, chunks: Vec<Bytes>, ended: bool) -> HijackResult<()> {
        for chunk in chunks {
            self.sink.raw_write(chunk)?;
        }
        // The replacement path may already have finalized the response.
        if ended && !self.sink.raw_finished() {
            self.sink.raw_end(None)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HijackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HijackSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for HijackSession {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Pump a shadow-readable into a replacement-writable, pausing while the
/// transport is above its high-water mark, and forward the end signal.
pub async fn pipe(
    readable: &mut ShadowReadable,
    writable: &ReplacementWritable,
) -> HijackResult<()> {
    while let Some(item) = readable.recv().await {
        let chunk = item?;
        if !writable.write(chunk)? {
            writable.drained().await;
        }
    }
    writable.end(None)
}
