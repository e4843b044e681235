//! Calls the next step service's `/process` endpoint.

use std::borrow::Cow;
use std::time::Duration;

use bizobs_types::{ChainErrorKind, ChainResponse, JourneyRequest, ServiceEndpoint};
use bizobs_util::TraceHeaders;
use bizobs_util::trace_headers::CORRELATION_ID_HEADER;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::ChainError;

/// Default hard deadline for one chained call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest upstream body excerpt kept in an error message.
const BODY_EXCERPT_LEN: usize = 200;

/// HTTP client for hop-to-hop journey calls.
#[derive(Debug, Clone)]
pub struct ChainCaller {
    client: reqwest::Client,
    timeout: Duration,
}

impl ChainCaller {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// POST `payload` to `http://127.0.0.1:<port>/process`.
    ///
    /// Only allow-listed trace headers are forwarded. A correlation id is
    /// generated only when neither the headers nor the payload carry one, and
    /// the payload is sent with the same id the headers carry.
    ///
    /// # Errors
    /// A [`ChainError`] whose kind separates transport failures, timeouts,
    /// undecodable bodies and upstream failures.
    pub async fn call(&self, endpoint: &ServiceEndpoint, payload: &JourneyRequest, headers: &TraceHeaders) -> Result<ChainResponse, ChainError> {
        let service_name = endpoint.service_name.as_str();
        let mut headers = headers.clone();
        if headers.correlation_id().is_none()
            && let Some(correlation_id) = payload.correlation_id.as_deref()
        {
            headers.insert(CORRELATION_ID_HEADER, correlation_id);
        }
        let correlation_id = headers.ensure_correlation_id();

        let body = match payload.correlation_id.as_deref() {
            Some(existing) if existing == correlation_id => Cow::Borrowed(payload),
            _ => Cow::Owned(payload.clone().with_correlation_id(correlation_id.clone())),
        };

        let url = process_url(endpoint.port);
        debug!(service = %service_name, port = endpoint.port, correlation_id = %correlation_id, "calling next step");

        let mut request = self.client.post(&url).timeout(self.timeout).json(&*body);
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|error| transport_error(service_name, &error))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|error| transport_error(service_name, &error))?;

        if !status.is_success() {
            let excerpt = excerpt(&bytes);
            warn!(service = %service_name, %status, "next step answered with an error status");
            return Err(ChainError::new(ChainErrorKind::Upstream, service_name, format!("HTTP {status}: {excerpt}")));
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|error| ChainError::new(ChainErrorKind::Parse, service_name, format!("invalid JSON from {url}: {error}")))?;

        if value.get("status").and_then(Value::as_str) == Some("failed") {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("step reported status failed")
                .to_string();
            return Err(ChainError::new(ChainErrorKind::Upstream, service_name, message));
        }

        serde_json::from_value(value).map_err(|error| ChainError::new(ChainErrorKind::Parse, service_name, format!("unexpected response shape: {error}")))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ChainCaller {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

fn process_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/process")
}

fn transport_error(service_name: &str, error: &reqwest::Error) -> ChainError {
    let kind = if error.is_timeout() {
        ChainErrorKind::Timeout
    } else if error.is_decode() {
        ChainErrorKind::Parse
    } else {
        ChainErrorKind::Network
    };
    ChainError::new(kind, service_name, error.to_string())
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}
