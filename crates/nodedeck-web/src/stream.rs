//! Streaming bodies: NDJSON phase events and live log lines

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use nodedeck_core::PhaseEvent;
use nodedeck_runtime::LineStream;
use std::convert::Infallible;
use tokio::sync::mpsc::UnboundedReceiver;

pub const NDJSON: &str = "application/x-ndjson";

/// One JSON object per line, ending when every sender is dropped
pub fn ndjson(rx: UnboundedReceiver<PhaseEvent>) -> Response {
    let lines = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(encode_line(&event)), rx))
    });
    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response()
}

pub fn encode_line(event: &PhaseEvent) -> Bytes {
    let mut line = serde_json::to_vec(event).unwrap_or_else(|e| {
        serde_json::json!({ "type": "failed", "step": "validate", "message": e.to_string() })
            .to_string()
            .into_bytes()
    });
    line.push(b'\n');
    Bytes::from(line)
}

/// Chunked plain text, one log line per chunk
pub fn log_lines(lines: LineStream) -> Response {
    let body = lines.map(|line| line.map(|l| Bytes::from(format!("{}\n", l))));
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
