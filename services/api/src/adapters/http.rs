//! services/api/src/adapters/http.rs
//!
//! Shared plumbing for the platform REST adapters: one HTTP client, and the
//! translation of transport failures and Google error envelopes into
//! `PortError`s.

use std::time::Duration;

use memoria_core::ports::PortError;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the client shared by every platform adapter.
pub fn client() -> Result<Client, reqwest::Error> {
    Client::builder().timeout(REQUEST_TIMEOUT).build()
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// A failed response, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub status: StatusCode,
    /// The envelope's `message` (for Identity Toolkit, the error key such as `EMAIL_NOT_FOUND`).
    pub message: String,
    /// The envelope's canonical status, e.g. `UNAVAILABLE`.
    pub reason: Option<String>,
}

impl ApiFailure {
    pub async fn read(response: Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => Self {
                status,
                message: envelope.error.message,
                reason: envelope.error.status,
            },
            Err(_) => Self {
                status,
                message: text,
                reason: None,
            },
        }
    }
}

/// Transport-level failures: no response was received.
pub fn transport_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Timeout(err.to_string())
    } else if err.is_decode() {
        PortError::platform("unknown-error", format!("malformed platform response: {}", err))
    } else {
        PortError::Network(err.to_string())
    }
}

/// Returns the response if successful, the platform's error otherwise.
pub async fn check(response: Response) -> Result<Response, ApiFailure> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApiFailure::read(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_deserialize_with_optional_status() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error":{"code":400,"message":"EMAIL_NOT_FOUND"}}"#).unwrap();
        assert_eq!(envelope.error.message, "EMAIL_NOT_FOUND");
        assert_eq!(envelope.error.status, None);
    }
}
