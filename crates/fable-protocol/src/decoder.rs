//! Server-sent event frame decoding

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use std::pin::Pin;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    events::StreamEvent,
};

/// A finite, non-restartable stream of decoded events for one send.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Frame payload signalling graceful end-of-stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Prefix of a frame carrying a server-side stream error.
pub const ERROR_SENTINEL: &str = "[ERROR]";

/// Outcome of parsing one frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(StreamEvent),
    /// Graceful end-of-stream sentinel.
    Done,
    /// Error sentinel with the embedded message.
    Error(String),
    /// Malformed payload; skipped without failing the stream.
    Skip,
}

/// Parse a single frame payload.
///
/// Malformed JSON never fails the stream: the payload is dropped and the
/// next frame parses from a clean boundary.
pub fn parse_frame(data: &str) -> Frame {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Frame::Done;
    }
    if let Some(rest) = data.strip_prefix(ERROR_SENTINEL) {
        return Frame::Error(rest.trim().to_string());
    }
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => Frame::Event(event),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed frame");
            Frame::Skip
        }
    }
}

/// Decode an event source into typed events.
///
/// The stream yields in source order with one frame of buffering. It ends
/// on the `[DONE]` sentinel, after yielding the error carried by an
/// `[ERROR]` frame, or when the cancellation token fires. Ending drops
/// the source, which closes the underlying connection.
pub fn decode(mut source: EventSource, cancel: CancellationToken) -> EventStream {
    let payloads = stream! {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => yield Ok(msg.data),
                Err(reqwest_eventsource::Error::StreamEnded) => return,
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    return;
                }
            }
        }
    };
    decode_payloads(payloads, cancel)
}

/// Decode raw frame payloads into typed events, honoring cancellation.
fn decode_payloads<S>(payloads: S, cancel: CancellationToken) -> EventStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(stream! {
        tokio::pin!(payloads);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    yield Err(Error::Aborted);
                    return;
                }
                next = payloads.next() => next,
            };

            let Some(item) = next else { return };
            match item {
                Ok(data) => match parse_frame(&data) {
                    Frame::Event(event) => yield Ok(event),
                    Frame::Done => return,
                    Frame::Error(message) => {
                        yield Err(Error::Stream(message));
                        return;
                    }
                    Frame::Skip => {}
                },
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}
