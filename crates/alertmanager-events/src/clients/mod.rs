//! HTTP collaborators: the Alertmanager alert list, the Sensu agent events
//! API and the Sensu backend API.

pub mod agent;
pub mod alertmanager;
pub mod backend;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{body_excerpt, ClientError};
use crate::event::EventRecord;

pub use agent::AgentApiSink;
pub use alertmanager::AlertmanagerClient;
pub use backend::{AuthToken, BackendClient, Credential};

/// Destination for outbound events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Get the name of this sink, for logging.
    fn name(&self) -> &'static str;

    /// Submit one event.
    async fn submit(&self, event: &EventRecord) -> Result<(), ClientError>;
}

/// Build an HTTP client with a per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Turn a non-2xx response into [`ClientError::Status`].
pub(crate) async fn ensure_success(
    method: &'static str,
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        method,
        url: url.to_string(),
        status,
        body,
    })
}

/// Decode a JSON body, quoting its head on failure.
pub(crate) fn decode_json<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(body).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
        excerpt: body_excerpt(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Alert;

    #[test]
    fn test_decode_json_error_quotes_body() {
        let err = decode_json::<Vec<Alert>>("http://am/api/v2/alerts", b"<html>oops</html>")
            .unwrap_err();
        match err {
            ClientError::Decode { url, excerpt, .. } => {
                assert_eq!(url, "http://am/api/v2/alerts");
                assert_eq!(excerpt, "<html>oops</html>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client(Duration::from_secs(10)).is_ok());
    }
}
