pub mod curl;
pub mod fallback;
pub mod http;

pub use curl::CurlTransport;
pub use fallback::FallbackTransport;
pub use http::HttpTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Browser-like User-Agent sent on every request unless the caller overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Per-request timeout used when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while moving bytes to or from a remote endpoint.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP client could not be built: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("external fetch process failed: {0}")]
    Process(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16, body: String },
}

impl FetchError {
    /// Whether the failure happened below HTTP (timeout, TLS, connection reset, spawn failure).
    ///
    /// Only these failures justify retrying the same request over another transport;
    /// a server that answered with an error status would answer the same way again.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Process(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A transport-agnostic description of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: &[(&str, &str)]) -> Self {
        for (name, value) in headers {
            self.headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A way of executing HTTP requests.
///
/// Implementations report any response the server produced as `Ok`, whatever its
/// status; `Err` is reserved for exchanges that never completed.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Issues a GET and returns the body of a successful response.
pub async fn fetch_text(
    transport: &dyn Transport,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<String, FetchError> {
    let request = HttpRequest::get(url).headers(headers);
    let response = transport.execute(&request).await?;

    if !response.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status,
            body: response.body,
        });
    }

    Ok(response.body)
}
