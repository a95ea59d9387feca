use super::{FetchError, HttpRequest, HttpResponse, Method, Transport, DEFAULT_USER_AGENT};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Native HTTP transport backed by `reqwest`.
///
/// Certificate verification is switched off: the upstream quote endpoints are known
/// to serve broken certificate chains, and every endpoint this client talks to is fixed
/// in code or configuration.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client with the given per-request timeout.
    ///
    /// # Errors
    /// Returns `FetchError::Client` if the TLS backend cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let transport_error = |e: reqwest::Error| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        debug!(
            method = request.method.as_str(),
            url = %request.url,
            status,
            bytes = body.len(),
            "http request completed"
        );

        Ok(HttpResponse { status, body })
    }
}
