//! HTTP plumbing shared by the hosted and local backends.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::debug;

use crate::{MuninnError, Result};

/// Longest error body excerpt kept in [`MuninnError::Api`] messages.
const MAX_ERROR_BODY: usize = 512;

/// TCP connect bound; request bounds are set per call.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client used by a backend.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("muninn/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MuninnError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Pass successful responses through, map failures to typed errors.
///
/// | status  | error                        |
/// |---------|------------------------------|
/// | 401/403 | `AuthenticationFailed`       |
/// | 404     | `ModelNotFound`              |
/// | 408     | `Timeout` (transient)        |
/// | 413     | `ContextLengthExceeded`      |
/// | 429     | `RateLimited` + retry-after  |
/// | other   | `Api { status, message }`    |
pub(crate) async fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(MuninnError::AuthenticationFailed),
        404 => Err(MuninnError::ModelNotFound(model.to_string())),
        408 => Err(MuninnError::Timeout(format!("{model}: server returned 408"))),
        413 => Err(MuninnError::ContextLengthExceeded {
            model: model.to_string(),
        }),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(MuninnError::RateLimited { retry_after })
        }
        code => {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(status = code, error = %e, "failed to read error response body");
                    String::new()
                }
            };
            let mut message: String = body.chars().take(MAX_ERROR_BODY).collect();
            if message.is_empty() {
                message = status.to_string();
            }
            Err(MuninnError::Api {
                status: code,
                message,
            })
        }
    }
}

/// Whether `request` answers with a success status.
///
/// Used by availability probes; any error means "no".
pub(crate) async fn probe(request: reqwest::RequestBuilder) -> bool {
    match request.send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
