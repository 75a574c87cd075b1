//! # chatstream - incremental streaming-event client
//!
//! Consumes a long-lived chunked HTTP response carrying a server-push event
//! stream and turns it into ordered callbacks for an application layer.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary safe: partial lines and split UTF-8 characters are carried
//!   over to the next chunk
//! - Two terminal conventions: inline `{"done": true}` payloads and bare
//!   `event:done` / `event:error` markers
//! - At most one terminal callback per session, none after cancellation
//! - Pluggable transport via the [`client::Transport`] trait
//!
//! ## Architecture
//!
//! Bytes flow through a pipeline of small state machines:
//!
//! 1. [`decoder::Utf8Decoder`] turns byte chunks into text
//! 2. [`framer::LineFramer`] cuts the text into complete lines
//! 3. [`sse::EventInterpreter`] maps lines to [`model::StreamEvent`]s
//! 4. [`session::StreamSession`] owns the read loop and invokes the
//!    [`session::StreamHandler`]
//! 5. [`cancel::CancelHandle`] aborts the session from outside
//!
//! ## Example
//! ```no_run
//! use chatstream::client::ChatClient;
//! use chatstream::http::ReqwestTransport;
//! use chatstream::options::{HttpEndpoint, TransportOptions};
//! use chatstream::session::Callbacks;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ReqwestTransport::new(TransportOptions::new(HttpEndpoint::new(
//!         "https://chat.example.com",
//!     )))?;
//!     let client = ChatClient::new(transport).with_credentials("your-token");
//!
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!     let error_tx = std::sync::Arc::new(std::sync::Mutex::new(Some(tx)));
//!     let done_tx = error_tx.clone();
//!
//!     let _cancel = client.stream_chat(
//!         "Hello!",
//!         "luna",
//!         Callbacks::new(
//!             |text| print!("{text}"),
//!             move || {
//!                 if let Some(tx) = done_tx.lock().unwrap().take() {
//!                     let _ = tx.send(());
//!                 }
//!             },
//!             move |error| {
//!                 eprintln!("stream failed: {error}");
//!                 if let Some(tx) = error_tx.lock().unwrap().take() {
//!                     let _ = tx.send(());
//!                 }
//!             },
//!         ),
//!     );
//!
//!     rx.await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod client;
pub mod decoder;
pub mod framer;
pub mod http;
pub mod model;
pub mod options;
pub mod session;
pub mod sse;

// Re-exports for convenience
pub use cancel::CancelHandle;
pub use client::{ChatClient, ClientError, Transport};
pub use model::{ChatRequest, StreamEvent};
pub use session::{Callbacks, SessionOutcome, StreamHandler};
