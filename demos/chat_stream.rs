//! Stream a chat reply to stdout. Ctrl-C cancels the stream.
//!
//! Run with:
//! ```bash
//! export CHATSTREAM_URL="https://chat.example.com"
//! export CHATSTREAM_TOKEN="your-token"
//! cargo run --example chat_stream -- "Tell me a story" luna
//! ```

use std::io::Write;
use std::time::Duration;

use chatstream::client::ChatClient;
use chatstream::http::ReqwestTransport;
use chatstream::options::{HttpEndpoint, TransportOptions};
use chatstream::session::Callbacks;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

enum Finished {
    Done,
    Failed(String),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let base_url =
        std::env::var("CHATSTREAM_URL").expect("CHATSTREAM_URL environment variable must be set");
    let token = std::env::var("CHATSTREAM_TOKEN").ok();

    let mut args = std::env::args().skip(1);
    let message = args.next().unwrap_or_else(|| "Hello!".to_string());
    let persona = args.next().unwrap_or_else(|| "default".to_string());

    let transport = ReqwestTransport::new(
        TransportOptions::new(HttpEndpoint::new(base_url))
            .with_connect_timeout(Duration::from_secs(10)),
    )?;

    let mut client = ChatClient::new(transport);
    if let Some(token) = token {
        client = client.with_credentials(token);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let error_tx = tx.clone();

    let cancel = client.stream_chat(
        message,
        persona,
        Callbacks::new(
            |text| {
                print!("{text}");
                // Show text as soon as it arrives
                let _ = std::io::stdout().flush();
            },
            move || {
                let _ = tx.send(Finished::Done);
            },
            move |error| {
                let _ = error_tx.send(Finished::Failed(error.to_string()));
            },
        ),
    );

    tokio::select! {
        finished = rx.recv() => match finished {
            Some(Finished::Done) => println!(),
            Some(Finished::Failed(error)) => {
                eprintln!("\nError in stream: {error}");
                std::process::exit(1);
            }
            None => {}
        },
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            eprintln!("\nCancelled");
        }
    }

    Ok(())
}
