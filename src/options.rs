//! Transport configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Default path of the streaming chat endpoint.
pub const DEFAULT_STREAM_PATH: &str = "/api/chat/stream";

/// A secret string type for sensitive data like bearer tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Generic transport options: fields every transport understands plus
/// transport-specific configuration.
///
/// # Example
/// ```rust
/// use chatstream::options::{HttpEndpoint, TransportOptions};
/// use std::time::Duration;
///
/// let options = TransportOptions::new(HttpEndpoint::new("https://chat.example.com"))
///     .with_connect_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions<T> {
    /// Timeout for establishing the connection
    pub connect_timeout: Option<Duration>,

    /// Timeout for the whole response, body included. Leave unset for long
    /// streams.
    pub timeout: Option<Duration>,

    /// Transport-specific options
    pub provider: T,
}

impl<T> TransportOptions<T> {
    /// Create new transport options with transport-specific configuration.
    pub fn new(provider: T) -> Self {
        Self {
            connect_timeout: None,
            timeout: None,
            provider,
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the overall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Where and how to reach the streaming endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    /// Base URL of the backend, without trailing slash
    pub base_url: String,

    /// Path of the streaming endpoint
    pub stream_path: String,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl HttpEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            proxy: None,
            extra_headers: None,
        }
    }

    /// Set the endpoint path.
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Full URL of the streaming endpoint.
    pub fn stream_url(&self) -> String {
        if self.stream_path.starts_with('/') {
            format!("{}{}", self.base_url, self.stream_path)
        } else {
            format!("{}/{}", self.base_url, self.stream_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = SecretString::from("hunter2");
        assert_eq!(format!("{secret:?}"), "SecretString([REDACTED])");
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_stream_url() {
        let endpoint = HttpEndpoint::new("https://chat.example.com/");
        assert_eq!(endpoint.stream_url(), "https://chat.example.com/api/chat/stream");

        let endpoint = endpoint.with_stream_path("v2/stream");
        assert_eq!(endpoint.stream_url(), "https://chat.example.com/v2/stream");
    }
}
