use std::convert::Infallible;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use cligate_core::chat::WireFormat;
use cligate_engine::FrameStream;
use cligate_wire::terminator;

/// `text/event-stream` body of encoded frames plus the format's end marker.
pub fn event_stream(frames: FrameStream, format: WireFormat) -> Response {
    let tail = futures::stream::iter(terminator(format));
    let body = frames
        .chain(tail)
        .map(|frame| Ok::<_, Infallible>(frame.encode()));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
