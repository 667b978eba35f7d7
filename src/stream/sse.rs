//! Server-Sent Events encoding for frames.

use std::convert::Infallible;

use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::Response,
};
use futures::{Stream, StreamExt};

use super::Frame;

/// Media type of the streaming endpoint.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Encode a frame as one SSE event.
///
/// Each line of the payload becomes a `data: ` line and the event ends with
/// a blank line. Payloads holding `\r` or `\n` are split so the event stays
/// intact; clients rejoin the lines with `\n`.
#[must_use]
pub fn encode(frame: &Frame) -> String {
    let payload = frame.payload();
    let mut out = String::with_capacity(payload.len() + 8);
    for line in payload.split(['\r', '\n']) {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Wrap a frame stream in a `text/event-stream` response.
pub fn into_response<S>(frames: S) -> Response
where
    S: Stream<Item = Frame> + Send + 'static,
{
    let body = Body::from_stream(frames.map(|frame| Ok::<String, Infallible>(encode(&frame))));
    build_sse_response(body)
}

fn build_sse_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}
