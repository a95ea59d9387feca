use super::{FetchError, HttpRequest, HttpResponse, Transport, DEFAULT_USER_AGENT};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Marker curl prints between the body and the status code.
const STATUS_MARKER: &str = "\n__CRUSH_SYNC_STATUS__:";

/// Transport that shells out to the `curl` binary.
///
/// Used as the secondary path when the native client cannot complete a handshake.
/// Same insecure TLS policy (`-k`), same User-Agent. Request bodies are streamed on
/// stdin so nothing touches the filesystem.
pub struct CurlTransport {
    program: String,
    timeout: Duration,
}

impl CurlTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("curl", timeout)
    }

    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn arguments(&self, request: &HttpRequest) -> Vec<String> {
        let mut args = vec![
            "-k".to_string(),
            "-s".to_string(),
            "-S".to_string(),
            "-X".to_string(),
            request.method.as_str().to_string(),
            "--max-time".to_string(),
            self.timeout.as_secs().max(1).to_string(),
            "-A".to_string(),
            DEFAULT_USER_AGENT.to_string(),
            "-w".to_string(),
            format!("{}%{{http_code}}", STATUS_MARKER),
        ];

        for (name, value) in &request.headers {
            args.push("-H".to_string());
            args.push(format!("{}: {}", name, value));
        }

        if request.body.is_some() {
            args.push("--data-binary".to_string());
            args.push("@-".to_string());
        }

        args.push(request.url.clone());
        args
    }
}

/// Splits curl's stdout into the response body and the trailing status code.
fn split_status(stdout: &str) -> Option<(String, u16)> {
    let idx = stdout.rfind(STATUS_MARKER)?;
    let status = stdout[idx + STATUS_MARKER.len()..].trim().parse().ok()?;
    Some((stdout[..idx].to_string(), status))
}

#[async_trait]
impl Transport for CurlTransport {
    fn name(&self) -> &'static str {
        "curl"
    }

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        info!(method = request.method.as_str(), url = %request.url, "executing curl");

        let mut command = Command::new(&self.program);
        command
            .args(self.arguments(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if request.body.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| FetchError::Process(format!("cannot spawn {}: {}", self.program, e)))?;

        if let (Some(body), Some(mut stdin)) = (&request.body, child.stdin.take()) {
            stdin
                .write_all(body.as_bytes())
                .await
                .map_err(|e| FetchError::Process(format!("cannot write request body: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| FetchError::Process(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Process(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (body, status) = split_status(&stdout).ok_or_else(|| {
            FetchError::Process("curl output did not carry a status code".to_string())
        })?;

        debug!(url = %request.url, status, bytes = body.len(), "curl request completed");
        Ok(HttpResponse { status, body })
    }
}
