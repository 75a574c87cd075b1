//! Chat client entry point, transport trait and error types.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, Instrument};

use crate::cancel::CancelHandle;
use crate::model::ChatRequest;
use crate::options::SecretString;
use crate::session::{SessionOutcome, StreamHandler, StreamSession};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Backend error: {0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport aborted the read itself. Not reported to `on_error`.
    #[error("Stream cancelled")]
    StreamCancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Response body as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Response of a transport before its body has been read.
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens the long-lived response carrying the event stream.
///
/// Implement this trait to plug in another HTTP stack or a fake backend.
/// Retries and redirects are the transport's business; the session only
/// sees the final response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, authenticating with `credentials` if given.
    async fn open(
        &self,
        request: &ChatRequest,
        credentials: Option<&SecretString>,
    ) -> Result<TransportResponse, ClientError>;
}

/// Client for streaming chat replies.
///
/// Cloning is cheap; every call to [`stream_chat`](Self::stream_chat) starts
/// an independent session.
///
/// # Example
/// ```no_run
/// use chatstream::client::ChatClient;
/// use chatstream::http::ReqwestTransport;
/// use chatstream::options::{HttpEndpoint, TransportOptions};
/// use chatstream::session::Callbacks;
///
/// # async fn demo() -> Result<(), chatstream::ClientError> {
/// let transport = ReqwestTransport::new(TransportOptions::new(HttpEndpoint::new(
///     "https://chat.example.com",
/// )))?;
/// let client = ChatClient::new(transport).with_credentials("token");
///
/// let cancel = client.stream_chat(
///     "Hello!",
///     "luna",
///     Callbacks::new(
///         |text| print!("{text}"),
///         || println!(),
///         |error| eprintln!("{error}"),
///     ),
/// );
/// # cancel.cancel();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    credentials: Option<SecretString>,
}

impl ChatClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            credentials: None,
        }
    }

    /// Set the bearer credentials sent with every session.
    pub fn with_credentials(mut self, credentials: impl Into<SecretString>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Start streaming a reply in the background.
    ///
    /// Must be called within a tokio runtime. The returned handle cancels the
    /// session; dropping it does not.
    pub fn stream_chat<H>(
        &self,
        content: impl Into<String>,
        persona: impl Into<String>,
        handler: H,
    ) -> CancelHandle
    where
        H: StreamHandler + 'static,
    {
        let request = ChatRequest::new(content, persona);
        let cancel = CancelHandle::new();
        let client = self.clone();
        let span = tracing::debug_span!("chat_stream", persona = %request.persona);

        tokio::spawn(
            {
                let cancel = cancel.clone();
                async move {
                    let mut handler = handler;
                    client.run_stream(&request, &mut handler, cancel).await
                }
            }
            .instrument(span),
        );

        cancel
    }

    /// Run one session to completion on the current task.
    pub async fn run_stream<H>(
        &self,
        request: &ChatRequest,
        handler: &mut H,
        cancel: CancelHandle,
    ) -> SessionOutcome
    where
        H: StreamHandler + ?Sized,
    {
        let mut session = StreamSession::new(cancel.clone());
        debug!("opening stream");

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream cancelled before response");
                return SessionOutcome::Cancelled;
            }
            opened = self.transport.open(request, self.credentials.as_ref()) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(error) => return session.fail(error, handler),
        };

        if !response.status.is_success() {
            let error = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionOutcome::Cancelled,
                error = status_error(response.status, response.body) => error,
            };
            return session.fail(error, handler);
        }

        let outcome = session.run(response.body, handler).await;
        debug!(?outcome, "stream closed");
        outcome
    }
}

/// Error bodies may carry a JSON message.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail", alias = "error")]
    message: String,
}

/// Longest error body read back from a failed response.
const MAX_ERROR_BODY: usize = 4096;

/// How long a failed response may take to deliver its body.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_millis(250);

async fn status_error(status: StatusCode, mut body: ByteStream) -> ClientError {
    let mut raw = Vec::new();
    let read = async {
        while raw.len() < MAX_ERROR_BODY {
            match body.next().await {
                Some(Ok(chunk)) => raw.extend_from_slice(&chunk),
                _ => break,
            }
        }
    };
    if tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await.is_err() {
        debug!(%status, "error body still open, reporting status without it");
    }
    raw.truncate(MAX_ERROR_BODY);

    let text = String::from_utf8_lossy(&raw).trim().to_string();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);

    ClientError::Status { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Callbacks;
    use futures::stream;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Calls {
        chunks: Vec<String>,
        done: usize,
        errors: Vec<String>,
    }

    /// Serves a canned response and records what it was asked.
    struct FakeTransport {
        status: StatusCode,
        chunks: Vec<&'static str>,
        seen: Arc<Mutex<Vec<(ChatRequest, Option<String>)>>>,
    }

    impl FakeTransport {
        fn new(status: StatusCode, chunks: Vec<&'static str>) -> Self {
            Self {
                status,
                chunks,
                seen: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn open(
            &self,
            request: &ChatRequest,
            credentials: Option<&SecretString>,
        ) -> Result<TransportResponse, ClientError> {
            self.seen.lock().unwrap().push((
                request.clone(),
                credentials.map(|c| c.expose_secret().to_string()),
            ));
            let chunks: Vec<Result<Bytes, ClientError>> =
                self.chunks.iter().map(|c| Ok(Bytes::from(*c))).collect();
            Ok(TransportResponse::new(self.status, Box::pin(stream::iter(chunks))))
        }
    }

    /// Never answers.
    struct HangingTransport;

    /// Answers with `status` and a body that never yields.
    struct OpenBodyTransport(StatusCode);

    #[async_trait]
    impl Transport for OpenBodyTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _credentials: Option<&SecretString>,
        ) -> Result<TransportResponse, ClientError> {
            let body = stream::pending::<Result<Bytes, ClientError>>();
            Ok(TransportResponse::new(self.0, Box::pin(body)))
        }
    }

    /// Fails to open because the transport aborted the request.
    struct AbortingTransport;

    #[async_trait]
    impl Transport for AbortingTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _credentials: Option<&SecretString>,
        ) -> Result<TransportResponse, ClientError> {
            Err(ClientError::StreamCancelled)
        }
    }

    #[async_trait]
    impl Transport for HangingTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _credentials: Option<&SecretString>,
        ) -> Result<TransportResponse, ClientError> {
            futures::future::pending().await
        }
    }

    fn recording(calls: &Arc<Mutex<Calls>>) -> impl StreamHandler + 'static {
        let (chunks, done, errors) = (calls.clone(), calls.clone(), calls.clone());
        Callbacks::new(
            move |text: &str| chunks.lock().unwrap().chunks.push(text.to_string()),
            move || done.lock().unwrap().done += 1,
            move |error: ClientError| errors.lock().unwrap().errors.push(error.to_string()),
        )
    }

    #[tokio::test]
    async fn test_streams_fragments_then_done() {
        let transport = FakeTransport::new(
            StatusCode::OK,
            vec![
                "data: {\"content\":\"Hel",
                "lo\",\"done\":false}\ndata: {\"content\":\" there\"}\n",
                "data: {\"content\":\"\",\"done\":true}\n",
            ],
        );
        let seen = transport.seen.clone();
        let client = ChatClient::new(transport).with_credentials("secret-token");

        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut handler = recording(&calls);
        let outcome = client
            .run_stream(&ChatRequest::new("hi", "luna"), &mut handler, CancelHandle::new())
            .await;

        assert_eq!(outcome, SessionOutcome::Completed);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.chunks, vec!["Hello", " there"]);
        assert_eq!(calls.done, 1);
        assert!(calls.errors.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, ChatRequest::new("hi", "luna"));
        assert_eq!(seen[0].1.as_deref(), Some("secret-token"));
    }

    #[tokio::test]
    async fn test_error_status_reported_before_body() {
        let transport = FakeTransport::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            vec!["{\"detail\":\"model overloaded\"}"],
        );
        let client = ChatClient::new(transport);

        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut handler = recording(&calls);
        let outcome = client
            .run_stream(&ChatRequest::new("hi", "luna"), &mut handler, CancelHandle::new())
            .await;

        assert_eq!(outcome, SessionOutcome::Failed);
        let calls = calls.lock().unwrap();
        assert!(calls.chunks.is_empty());
        assert_eq!(calls.done, 0);
        assert_eq!(
            calls.errors,
            vec!["HTTP 500 Internal Server Error: model overloaded"]
        );
    }

    #[tokio::test]
    async fn test_error_status_with_plain_body() {
        let body = vec![Ok::<_, ClientError>(Bytes::from_static(b"upstream down\n"))];
        let error = status_error(StatusCode::BAD_GATEWAY, Box::pin(stream::iter(body))).await;

        match error {
            ClientError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_with_open_body_still_fails() {
        let client = ChatClient::new(OpenBodyTransport(StatusCode::INTERNAL_SERVER_ERROR));

        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut handler = recording(&calls);
        let request = ChatRequest::new("hi", "luna");
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            client.run_stream(&request, &mut handler, CancelHandle::new()),
        )
        .await
        .expect("error status should not wait for the body to close");

        assert_eq!(outcome, SessionOutcome::Failed);
        let calls = calls.lock().unwrap();
        assert!(calls.chunks.is_empty());
        assert_eq!(calls.done, 0);
        assert_eq!(calls.errors.len(), 1);
        assert!(calls.errors[0].starts_with("HTTP 500 Internal Server Error"));
    }

    #[tokio::test]
    async fn test_transport_abort_while_opening_is_silent() {
        let client = ChatClient::new(AbortingTransport);

        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut handler = recording(&calls);
        let request = ChatRequest::new("hi", "luna");
        let outcome = client
            .run_stream(&request, &mut handler, CancelHandle::new())
            .await;

        assert_eq!(outcome, SessionOutcome::Cancelled);
        let calls = calls.lock().unwrap();
        assert!(calls.chunks.is_empty());
        assert_eq!(calls.done, 0);
        assert!(calls.errors.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_opening() {
        let client = ChatClient::new(HangingTransport);
        let cancel = CancelHandle::new();

        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut handler = recording(&calls);
        let request = ChatRequest::new("hi", "luna");
        let session = client.run_stream(&request, &mut handler, cancel.clone());

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(session, canceller);

        assert_eq!(outcome, SessionOutcome::Cancelled);
        let calls = calls.lock().unwrap();
        assert!(calls.chunks.is_empty());
        assert_eq!(calls.done, 0);
        assert!(calls.errors.is_empty());
    }

    #[tokio::test]
    async fn test_stream_chat_runs_in_background() {
        let transport = FakeTransport::new(
            StatusCode::OK,
            vec!["event:error\ndata: {\"message\":\"boom\"}\n"],
        );
        let client = ChatClient::new(transport);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let _cancel = client.stream_chat(
            "hi",
            "luna",
            Callbacks::new(
                |_| {},
                || {},
                move |error| {
                    let _ = tx.send(error.to_string());
                },
            ),
        );

        let message = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("on_error should fire")
            .unwrap();
        assert_eq!(message, "Backend error: boom");
    }
}
