//! HTTP transport for the event stream, built on reqwest.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::client::{ClientError, Transport, TransportResponse};
use crate::model::ChatRequest;
use crate::options::{HttpEndpoint, SecretString, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(
    transport_options: &TransportOptions<HttpEndpoint>,
) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.provider.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Add extra headers to a request if specified in the endpoint options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// [`Transport`] that POSTs the chat request and streams the response body.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    options: TransportOptions<HttpEndpoint>,
}

impl ReqwestTransport {
    pub fn new(options: TransportOptions<HttpEndpoint>) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    /// Reuse an existing reqwest client; its own timeouts and proxy apply.
    pub fn with_client(http: Client, options: TransportOptions<HttpEndpoint>) -> Self {
        Self { http, options }
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        credentials: Option<&SecretString>,
    ) -> RequestBuilder {
        let mut req = self
            .http
            .post(self.options.provider.stream_url())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        if let Some(token) = credentials {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        add_extra_headers(req, &self.options.provider.extra_headers).json(request)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(
        &self,
        request: &ChatRequest,
        credentials: Option<&SecretString>,
    ) -> Result<TransportResponse, ClientError> {
        let response = self
            .build_request(request, credentials)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        debug!(%status, "stream response received");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(transport_error));

        Ok(TransportResponse::new(status, Box::pin(body)))
    }
}

/// Map a reqwest failure, keeping aborted reads apart from real errors.
fn transport_error(error: reqwest::Error) -> ClientError {
    if is_aborted(&error) {
        debug!(error = %error, "transport read aborted");
        ClientError::StreamCancelled
    } else {
        ClientError::Http(error)
    }
}

/// Whether any error in the source chain is an aborted connection.
fn is_aborted(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(io_error) = error.downcast_ref::<io::Error>() {
            if io_error.kind() == io::ErrorKind::ConnectionAborted {
                return true;
            }
        }
        current = error.source();
    }
    false
}
