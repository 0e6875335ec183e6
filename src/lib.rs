//! Intercept an in-flight outbound response stream.
//!
//! A producer writes to a [`ResponseSink`] as if it owned the connection.
//! [`hijack`] retrofits a man-in-the-middle point into that sink: everything
//! the producer writes replays on the session's shadow-readable, and the
//! session's replacement-writable becomes the only path to the real
//! transport. The producer never notices. [`HijackSession::unhijack`] hands
//! the sink back.
//!
//! ```no_run
//! # async fn demo() -> Result<(), hijack_response::HijackError> {
//! use hijack_response::{hijack, transport_channel, ResponseSink};
//!
//! let (handle, _connection) = transport_channel(16 * 1024);
//! let sink = ResponseSink::new(handle);
//!
//! let mut session = hijack(&sink).await?;
//! // ... producer writes to `sink`, unaware ...
//! while let Some(chunk) = session.readable.recv().await {
//!     let chunk = chunk?;
//!     session.writable.send(chunk.to_ascii_uppercase()).await?;
//! }
//! session.writable.end(None)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod intercept;
pub mod session;
pub mod sink;

pub use error::{HijackError, HijackResult};
pub use intercept::{
    hijack, hijack_with, hijack_with_options, HijackFuture, SessionOptions,
    DEFAULT_HIGH_WATER_MARK,
};
pub use session::{
    pipe, FlushMode, HijackSession, ReplacementWritable, SessionState, ShadowMeta,
    ShadowReadable,
};
pub use sink::transport::{transport_channel, TransportFrame, TransportHandle, TransportReceiver};
pub use sink::ResponseSink;
