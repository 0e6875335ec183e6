//! Error definitions for the interception library.

use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur while hijacking a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HijackError {
    /// A hijack was requested on a sink that already has one armed or active.
    /// Nested hijacking is rejected rather than stacked.
    #[error("response is already hijacked")]
    DoubleHijack,

    /// A hijack was requested after the producer already ended the response.
    #[error("response already finished, nothing to intercept")]
    SinkAlreadyFinished,

    /// A write or end was attempted after the stream was terminated.
    #[error("write after end")]
    WriteAfterEnd,

    /// Status or header mutation was attempted after the head was committed,
    /// either sent on the wire or locked into an interception snapshot.
    #[error("headers already sent")]
    HeadersSent,

    /// `unhijack` was called outside the `active` state.
    #[error("session is {actual}, unhijack requires an active session")]
    InvalidSessionState {
        /// The state the session was actually in.
        actual: SessionState,
    },

    /// The underlying transport was closed or reset by the remote peer.
    #[error("transport closed by peer")]
    TransportClosed,
}

/// Result type for hijack operations.
pub type HijackResult<T> = Result<T, HijackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            HijackError::DoubleHijack.to_string(),
            "response is already hijacked"
        );

        let err = HijackError::InvalidSessionState {
            actual: SessionState::Restored,
        };
        assert!(err.to_string().contains("restored"));
    }
}
