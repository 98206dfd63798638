//! Error types for the Alertmanager to Sensu bridge.

use thiserror::Error;

/// Number of response bytes quoted in decode errors.
pub const BODY_EXCERPT_LEN: usize = 64;

/// Malformed configuration, detected before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `key=value` list option without any `=`
    #[error("Please use Format: {expected}. Wrong format --{flag} {value}")]
    MalformedPairs {
        flag: &'static str,
        expected: &'static str,
        value: String,
    },

    /// The auto-close label predicate is not a JSON object of strings
    #[error("Wrong format --auto-close-sensu-label {value}: {source}")]
    AutoCloseLabel {
        value: String,
        #[source]
        source: serde_json::Error,
    },

    /// The trusted CA bundle could not be loaded
    #[error("Error loading specified CA file {path}: {reason}")]
    TrustedCa { path: String, reason: String },

    /// A URL option that must be absolute is not
    #[error("Invalid URL for --{flag}: {value}")]
    InvalidUrl { flag: &'static str, value: String },
}

/// Errors raised by the HTTP collaborators (Alertmanager, agent API, backend API).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or client construction failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-2xx status
    #[error("{method} {url} failed with status {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The backend refused the basic credentials
    #[error("authorization failed for user {0}")]
    Unauthorized(String),

    /// The response body was not the JSON we expected
    #[error("error decoding response from {url}: {source}\nFirst 64 bytes of response: {excerpt}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },
}

/// Run-level failures. Fatal errors abort their branch; the aggregate
/// variants summarise per-item dispatch failures.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Failed to get alert manager alerts: {0}")]
    FetchAlerts(#[source] ClientError),

    #[error("Failed to authenticate with sensu backend: {0}")]
    Authenticate(#[source] ClientError),

    #[error("Failed to get sensu events: {0}")]
    FetchEvents(#[source] ClientError),

    #[error("cannot create all events in sensu ({0} failed)")]
    CreateFailures(usize),

    #[error("cannot close all events in sensu backend ({0} failed)")]
    CloseFailures(usize),
}

impl CheckError {
    /// Whether the error stopped a branch, as opposed to counting item failures.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FetchAlerts(_) | Self::Authenticate(_) | Self::FetchEvents(_)
        )
    }
}

/// First [`BODY_EXCERPT_LEN`] bytes of a response body, lossily decoded.
pub(crate) fn body_excerpt(body: &[u8]) -> String {
    let end = body.len().min(BODY_EXCERPT_LEN);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_excerpt_truncates() {
        let body = "x".repeat(100);
        assert_eq!(body_excerpt(body.as_bytes()).len(), BODY_EXCERPT_LEN);
        assert_eq!(body_excerpt(b"short"), "short");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CheckError::FetchAlerts(ClientError::Unauthorized("admin".into())).is_fatal());
        assert!(!CheckError::CreateFailures(2).is_fatal());
        assert!(!CheckError::CloseFailures(1).is_fatal());
    }

    #[test]
    fn test_aggregate_messages() {
        assert!(CheckError::CreateFailures(3)
            .to_string()
            .starts_with("cannot create all events"));
        assert!(CheckError::CloseFailures(1)
            .to_string()
            .starts_with("cannot close all events"));
    }
}
