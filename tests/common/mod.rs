//! Shared utilities for integration tests.
#![allow(dead_code)]

use http::{HeaderMap, StatusCode};
use hijack_response::{transport_channel, ResponseSink, TransportFrame, TransportReceiver};

pub const TEST_HIGH_WATER_MARK: usize = 16 * 1024;

/// Build a sink wired to a fresh transport channel.
pub fn response_pair() -> (ResponseSink, TransportReceiver) {
    response_pair_with_capacity(TEST_HIGH_WATER_MARK)
}

/// Build a sink whose transport pushes back above `high_water_mark` bytes.
pub fn response_pair_with_capacity(high_water_mark: usize) -> (ResponseSink, TransportReceiver) {
    let (handle, receiver) = transport_channel(high_water_mark);
    (ResponseSink::new(handle), receiver)
}

/// Everything the client would have observed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub ended: bool,
}

impl ClientResponse {
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).expect("body was not utf-8")
    }
}

/// Drain the connection side of the transport into a [`ClientResponse`].
pub async fn collect_response(mut receiver: TransportReceiver) -> ClientResponse {
    let mut response = ClientResponse {
        status: StatusCode::OK,
        reason: None,
        headers: HeaderMap::new(),
        body: Vec::new(),
        ended: false,
    };
    while let Some(frame) = receiver.recv().await {
        match frame {
            TransportFrame::Head {
                status,
                reason,
                headers,
            } => {
                response.status = status;
                response.reason = reason;
                response.headers = headers;
            }
            TransportFrame::Body(chunk) => response.body.extend_from_slice(&chunk),
            TransportFrame::End => response.ended = true,
        }
    }
    response
}
