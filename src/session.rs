//! Stream session: the read loop that dispatches events to callbacks.
//!
//! A [`StreamSession`] owns the decoding state of one in-flight request. It
//! reads one chunk at a time, runs every complete line of that chunk through
//! the [`EventDecoder`], and invokes the [`StreamHandler`] synchronously for
//! each event before reading the next chunk. The first terminal event ends the
//! session; after that, or after cancellation, no callback fires again.

use std::ops::ControlFlow;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use crate::cancel::CancelHandle;
use crate::client::ClientError;
use crate::model::StreamEvent;
use crate::sse::EventDecoder;

/// Application callbacks for one stream.
///
/// `on_chunk` may fire any number of times; then exactly one of `on_done` or
/// `on_error` fires, unless the session is cancelled, in which case neither
/// does.
pub trait StreamHandler: Send {
    /// A content fragment arrived.
    fn on_chunk(&mut self, text: &str);

    /// The stream completed.
    fn on_done(&mut self);

    /// The stream failed.
    fn on_error(&mut self, error: ClientError);
}

/// [`StreamHandler`] built from three closures.
///
/// # Example
/// ```
/// use chatstream::session::Callbacks;
///
/// let mut reply = String::new();
/// let handler = Callbacks::new(
///     move |text| reply.push_str(text),
///     || println!("done"),
///     |error| eprintln!("failed: {error}"),
/// );
/// # let _ = handler;
/// ```
pub struct Callbacks<C, D, E> {
    on_chunk: C,
    on_done: Option<D>,
    on_error: Option<E>,
}

impl<C, D, E> Callbacks<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnOnce() + Send,
    E: FnOnce(ClientError) + Send,
{
    pub fn new(on_chunk: C, on_done: D, on_error: E) -> Self {
        Self {
            on_chunk,
            on_done: Some(on_done),
            on_error: Some(on_error),
        }
    }
}

impl<C, D, E> StreamHandler for Callbacks<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnOnce() + Send,
    E: FnOnce(ClientError) + Send,
{
    fn on_chunk(&mut self, text: &str) {
        (self.on_chunk)(text)
    }

    fn on_done(&mut self) {
        self.on_error = None;
        if let Some(on_done) = self.on_done.take() {
            on_done();
        }
    }

    fn on_error(&mut self, error: ClientError) {
        self.on_done = None;
        if let Some(on_error) = self.on_error.take() {
            on_error(error);
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `on_done` fired
    Completed,
    /// `on_error` fired
    Failed,
    /// Cancelled before a terminal callback; nothing fired at the end
    Cancelled,
}

/// Live state of one streaming request.
#[derive(Debug)]
pub struct StreamSession {
    events: EventDecoder,
    cancel: CancelHandle,
    outcome: Option<SessionOutcome>,
}

impl StreamSession {
    pub fn new(cancel: CancelHandle) -> Self {
        Self {
            events: EventDecoder::new(),
            cancel,
            outcome: None,
        }
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Whether no further callback may fire.
    pub fn is_terminated(&self) -> bool {
        self.outcome.is_some() || self.cancel.is_cancelled()
    }

    /// Drive the session over a response body until it terminates.
    ///
    /// The body is dropped, not drained, as soon as a terminal event is
    /// dispatched or the session is cancelled.
    pub async fn run<S, H>(mut self, body: S, handler: &mut H) -> SessionOutcome
    where
        S: Stream<Item = Result<Bytes, ClientError>>,
        H: StreamHandler + ?Sized,
    {
        let cancel = self.cancel.clone();
        let mut body = std::pin::pin!(body);

        loop {
            if let Some(outcome) = self.settled() {
                return outcome;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => continue,
                next = body.next() => next,
            };

            // Cancellation may have landed while the read was in flight
            if let Some(outcome) = self.settled() {
                return outcome;
            }

            match next {
                Some(Ok(chunk)) => {
                    trace!(len = chunk.len(), "received chunk");
                    if let ControlFlow::Break(outcome) = self.feed_chunk(&chunk, handler) {
                        return outcome;
                    }
                }
                Some(Err(error)) => return self.fail(error, handler),
                None => return self.finish(handler),
            }
        }
    }

    /// Dispatch the events of one chunk.
    ///
    /// Breaks with the outcome once the session has terminated.
    pub fn feed_chunk<H>(&mut self, chunk: &[u8], handler: &mut H) -> ControlFlow<SessionOutcome>
    where
        H: StreamHandler + ?Sized,
    {
        if let Some(outcome) = self.settled() {
            return ControlFlow::Break(outcome);
        }

        let events = self.events.feed(chunk);
        self.dispatch(events, handler)
    }

    /// End of input: flush buffered text, then complete implicitly if the
    /// backend never sent a terminal marker.
    pub fn finish<H>(&mut self, handler: &mut H) -> SessionOutcome
    where
        H: StreamHandler + ?Sized,
    {
        if let Some(outcome) = self.settled() {
            return outcome;
        }

        let events = self.events.finish();
        if let ControlFlow::Break(outcome) = self.dispatch(events, handler) {
            return outcome;
        }

        debug!("stream ended without terminal marker");
        self.outcome = Some(SessionOutcome::Completed);
        handler.on_done();
        SessionOutcome::Completed
    }

    /// Report a transport failure, unless the session already terminated.
    ///
    /// [`ClientError::StreamCancelled`] ends the session as cancelled and
    /// never reaches `on_error`.
    pub fn fail<H>(&mut self, error: ClientError, handler: &mut H) -> SessionOutcome
    where
        H: StreamHandler + ?Sized,
    {
        if let Some(outcome) = self.settled() {
            debug!(error = %error, "ignoring transport error after termination");
            return outcome;
        }

        if matches!(error, ClientError::StreamCancelled) {
            debug!("transport aborted the stream");
            self.outcome = Some(SessionOutcome::Cancelled);
            return SessionOutcome::Cancelled;
        }

        warn!(error = %error, "stream failed");
        self.outcome = Some(SessionOutcome::Failed);
        handler.on_error(error);
        SessionOutcome::Failed
    }

    fn dispatch<H>(&mut self, events: Vec<StreamEvent>, handler: &mut H) -> ControlFlow<SessionOutcome>
    where
        H: StreamHandler + ?Sized,
    {
        for event in events {
            // A callback may have cancelled the session
            if let Some(outcome) = self.settled() {
                return ControlFlow::Break(outcome);
            }

            match event {
                StreamEvent::Content(text) => handler.on_chunk(&text),
                StreamEvent::Done => {
                    debug!("stream completed");
                    self.outcome = Some(SessionOutcome::Completed);
                    handler.on_done();
                    return ControlFlow::Break(SessionOutcome::Completed);
                }
                StreamEvent::Error(message) => {
                    debug!(%message, "backend reported error");
                    self.outcome = Some(SessionOutcome::Failed);
                    handler.on_error(ClientError::Remote(message));
                    return ControlFlow::Break(SessionOutcome::Failed);
                }
            }
        }

        match self.settled() {
            Some(outcome) => ControlFlow::Break(outcome),
            None => ControlFlow::Continue(()),
        }
    }

    fn settled(&mut self) -> Option<SessionOutcome> {
        if self.outcome.is_none() && self.cancel.is_cancelled() {
            debug!("stream cancelled");
            self.outcome = Some(SessionOutcome::Cancelled);
        }
        self.outcome
    }
}
