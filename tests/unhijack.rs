//! Restore semantics: flush, discard, continuations and state handling.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use hijack_response::{hijack, FlushMode, HijackError, SessionState, TransportFrame};

mod common;

#[tokio::test]
async fn immediate_unhijack_leaves_no_interception_artifacts() {
    let (sink, mut receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    session.unhijack(FlushMode::Flush).unwrap();
    assert_eq!(session.state(), SessionState::Restored);

    // The producer proceeds against the restored sink.
    sink.write("foo").unwrap();
    sink.end(None).unwrap();

    assert!(matches!(
        receiver.recv().await,
        Some(TransportFrame::Head { .. })
    ));
    assert_eq!(
        receiver.recv().await,
        Some(TransportFrame::Body(Bytes::from_static(b"foo")))
    );
    assert_eq!(receiver.recv().await, Some(TransportFrame::End));
    assert_eq!(receiver.recv().await, None);
}

#[tokio::test]
async fn flush_delivers_buffered_shadow_data() {
    let (sink, receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .unwrap();
    sink.write("foo").unwrap();
    sink.end(Some(Bytes::from_static(b"bar"))).unwrap();

    // Nothing was consumed from the shadow; flush must not lose it.
    session.unhijack(FlushMode::Flush).unwrap();

    let response = common::collect_response(receiver).await;
    assert_eq!(response.body_str(), "foobar");
    assert_eq!(response.headers.get("content-type").unwrap(), "text/plain");
    assert!(response.ended);
}

#[tokio::test]
async fn discard_drops_buffered_shadow_data() {
    let (sink, receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    sink.write("GARBAGE").unwrap();
    session.unhijack(FlushMode::Discard).unwrap();

    // The producer had not ended; it continues directly.
    sink.end(Some(Bytes::from_static(b"tail"))).unwrap();

    let response = common::collect_response(receiver).await;
    assert_eq!(response.body_str(), "tail");
}

#[tokio::test]
async fn error_continuation_produces_a_500_response() {
    let (sink, receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .unwrap();
    sink.write("GARBAGE REDACTED").unwrap();

    // Inspect the stream, decide to bail out and report downstream.
    let first = session.readable.recv().await.unwrap().unwrap();
    assert_eq!(&first[..], b"GARBAGE REDACTED");

    session
        .unhijack_with(|res| {
            res.set_status(StatusCode::INTERNAL_SERVER_ERROR).unwrap();
            res.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .unwrap();
            res.end(Some(Bytes::from_static(b"{\"error\":\"Nah\"}")))
                .unwrap();
        })
        .unwrap();

    let response = common::collect_response(receiver).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(response.body_str(), "{\"error\":\"Nah\"}");
}

#[tokio::test]
async fn second_unhijack_fails_without_further_mutation() {
    let (sink, receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    sink.end(Some(Bytes::from_static(b"foo"))).unwrap();
    session.unhijack(FlushMode::Flush).unwrap();

    assert_eq!(
        session.unhijack(FlushMode::Flush).unwrap_err(),
        HijackError::InvalidSessionState {
            actual: SessionState::Restored,
        }
    );
    assert_eq!(session.state(), SessionState::Restored);

    let response = common::collect_response(receiver).await;
    assert_eq!(response.body_str(), "foo");
    assert!(response.ended);
}

#[tokio::test]
async fn restore_revokes_the_replacement_writable() {
    let (sink, _receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    session.unhijack(FlushMode::Flush).unwrap();

    assert_eq!(
        session.writable.write("stray").unwrap_err(),
        HijackError::WriteAfterEnd
    );
}

#[tokio::test]
async fn restore_terminates_the_shadow_readable() {
    let (sink, _receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    sink.write("buffered").unwrap();
    session.unhijack(FlushMode::Discard).unwrap();

    assert_eq!(session.readable.recv().await, None);
}

#[tokio::test]
async fn flush_against_a_closed_transport_fails_the_session() {
    let (sink, receiver) = common::response_pair();
    let mut session = hijack(&sink).await.unwrap();

    sink.write("foo").unwrap();
    receiver.close();

    assert_eq!(
        session.unhijack(FlushMode::Flush).unwrap_err(),
        HijackError::TransportClosed
    );
    assert_eq!(session.state(), SessionState::Failed);

    // Failed is terminal.
    assert_eq!(
        session.unhijack(FlushMode::Flush).unwrap_err(),
        HijackError::InvalidSessionState {
            actual: SessionState::Failed,
        }
    );
}
