//! Server-Sent Events (SSE) line interpretation and event decoding.
//!
//! The backend speaks a small line protocol:
//! ```text
//! data: {"content": "Hel", "done": false}
//! data: {"content": "", "done": true}
//! event:done
//! event:error
//! data: {"message": "boom"}
//! ```
//!
//! Lines are interpreted one at a time by [`EventInterpreter`];
//! [`EventDecoder`] chains byte decoding, line framing and interpretation for
//! a whole stream, and [`SseStreamExt`] exposes the result as a lazy
//! [`Stream`] of [`StreamEvent`]s.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, trace};

use crate::client::ClientError;
use crate::decoder::Utf8Decoder;
use crate::framer::LineFramer;
use crate::model::{DataPayload, ErrorPayload, StreamEvent};

/// Message used when the backend signals an error without a payload.
pub const GENERIC_ERROR_MESSAGE: &str = "stream reported an error";

/// Shape of a single protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `data:` line, carrying the trimmed payload
    Data(&'a str),
    /// `event:` line, carrying the trimmed event name
    Event(&'a str),
    /// Blank, comment or unrecognized line
    Other,
}

/// Classify a line by its prefix.
///
/// Surrounding whitespace, including a trailing `\r`, is ignored.
///
/// # Example
/// ```
/// use chatstream::sse::{parse_sse_line, SseLine};
///
/// assert_eq!(parse_sse_line("data: {\"a\":1}\r"), SseLine::Data("{\"a\":1}"));
/// assert_eq!(parse_sse_line("event:done"), SseLine::Event("done"));
/// assert_eq!(parse_sse_line(": keepalive"), SseLine::Other);
/// ```
pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    let line = line.trim();

    if let Some(data) = line.strip_prefix("data:") {
        return SseLine::Data(data.trim());
    }

    if let Some(name) = line.strip_prefix("event:") {
        return SseLine::Event(name.trim());
    }

    SseLine::Other
}

/// Turns protocol lines into [`StreamEvent`]s.
///
/// The only state is whether an `event:error` marker is waiting for its
/// payload line.
#[derive(Debug, Default)]
pub struct EventInterpreter {
    error_pending: bool,
}

impl EventInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret one line. Malformed or unrecognized lines yield `None`.
    pub fn interpret(&mut self, line: &str) -> Option<StreamEvent> {
        match parse_sse_line(line) {
            SseLine::Data("") | SseLine::Other => None,
            SseLine::Data(data) if self.error_pending => {
                self.error_pending = false;
                Some(StreamEvent::Error(parse_error_payload(data)))
            }
            SseLine::Data(data) => parse_data_payload(data),
            SseLine::Event(name) => self.interpret_marker(name),
        }
    }

    /// Resolve state left over at end of stream.
    ///
    /// An `event:error` marker that never received a payload becomes a
    /// generic error.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        std::mem::take(&mut self.error_pending)
            .then(|| StreamEvent::Error(GENERIC_ERROR_MESSAGE.to_string()))
    }

    /// Markers match by prefix, so `event:done-final` counts as `done`.
    fn interpret_marker(&mut self, name: &str) -> Option<StreamEvent> {
        let is_done = name.starts_with("done");
        let is_error = name.starts_with("error");

        // An earlier error marker wins over any later terminal marker
        if self.error_pending && (is_done || is_error) {
            return self.finish();
        }

        if is_done {
            Some(StreamEvent::Done)
        } else if is_error {
            self.error_pending = true;
            None
        } else {
            trace!(event = name, "ignoring unknown event marker");
            None
        }
    }
}

fn parse_data_payload(data: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<DataPayload>(data) {
        Ok(payload) if payload.done => Some(StreamEvent::Done),
        Ok(payload) if !payload.content.is_empty() => Some(StreamEvent::Content(payload.content)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "skipping malformed data frame");
            None
        }
    }
}

fn parse_error_payload(data: &str) -> String {
    serde_json::from_str::<ErrorPayload>(data)
        .map(|payload| payload.message)
        .unwrap_or_else(|_| data.to_string())
}

/// Byte-to-event pipeline for one stream.
///
/// # Example
/// ```
/// use chatstream::model::StreamEvent;
/// use chatstream::sse::EventDecoder;
///
/// let mut decoder = EventDecoder::new();
/// assert!(decoder.feed(b"data: {\"content\":\"Hel").is_empty());
/// assert_eq!(
///     decoder.feed(b"lo\"}\nevent:done\n"),
///     vec![StreamEvent::Content("Hello".into()), StreamEvent::Done]
/// );
/// ```
#[derive(Debug, Default)]
pub struct EventDecoder {
    decoder: Utf8Decoder,
    framer: LineFramer,
    interpreter: EventInterpreter,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk and return the events of every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let text = self.decoder.decode(chunk, false);
        let lines = self.framer.feed(&text);
        self.interpret_all(lines)
    }

    /// Flush all buffered state at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let text = self.decoder.finish();
        let mut lines = self.framer.feed(&text);
        lines.extend(self.framer.flush());

        let mut events = self.interpret_all(lines);
        events.extend(self.interpreter.finish());
        events
    }

    fn interpret_all(&mut self, lines: Vec<String>) -> Vec<StreamEvent> {
        lines
            .iter()
            .filter_map(|line| self.interpreter.interpret(line))
            .collect()
    }
}

/// Extension trait turning a response body into a lazy stream of events.
///
/// # Example
/// ```ignore
/// use chatstream::sse::SseStreamExt;
///
/// let mut events = Box::pin(body.stream_events());
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// ```
pub trait SseStreamExt {
    /// Convert the byte stream into interpreted events.
    ///
    /// The stream ends right after the first terminal event. If the bytes end
    /// without one, an implicit [`StreamEvent::Done`] is yielded. A transport
    /// error is yielded once and ends the stream.
    fn stream_events(self) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send;
}

impl<S> SseStreamExt for S
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send,
{
    fn stream_events(self) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send {
        stream::unfold(
            (Box::pin(self), EventDecoder::new(), VecDeque::<StreamEvent>::new(), false),
            |(mut body, mut decoder, mut queue, mut finished)| async move {
                loop {
                    if let Some(event) = queue.pop_front() {
                        if event.is_terminal() {
                            // Anything after the first terminal event is dropped
                            queue.clear();
                            finished = true;
                        }
                        return Some((Ok(event), (body, decoder, queue, finished)));
                    }

                    if finished {
                        return None;
                    }

                    match body.next().await {
                        Some(Ok(chunk)) => queue.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            finished = true;
                            return Some((Err(e), (body, decoder, queue, finished)));
                        }
                        None => {
                            let mut events = decoder.finish();
                            if !events.iter().any(StreamEvent::is_terminal) {
                                events.push(StreamEvent::Done);
                            }
                            queue.extend(events);
                            finished = true;
                        }
                    }
                }
            },
        )
    }
}
