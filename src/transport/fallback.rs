use super::{CurlTransport, FetchError, HttpRequest, HttpResponse, HttpTransport, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Tries `primary` first and retries once on `secondary` when the primary never
/// produced a response.
pub struct FallbackTransport {
    primary: Box<dyn Transport>,
    secondary: Box<dyn Transport>,
}

impl FallbackTransport {
    pub fn new(primary: Box<dyn Transport>, secondary: Box<dyn Transport>) -> Self {
        Self { primary, secondary }
    }

    /// Native `reqwest` client with `curl` behind it, both using `timeout`.
    pub fn standard(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::new(
            Box::new(HttpTransport::new(timeout)?),
            Box::new(CurlTransport::new(timeout)),
        ))
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        match self.primary.execute(request).await {
            Err(err) if err.is_transport() => {
                warn!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    url = %request.url,
                    error = %err,
                    "primary transport failed, retrying on secondary"
                );
                self.secondary.execute(request).await
            }
            other => other,
        }
    }
}
