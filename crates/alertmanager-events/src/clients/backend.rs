//! Sensu backend API client, used only for auto-close.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::{decode_json, ensure_success};
use crate::config::{BackendConfig, CheckConfig};
use crate::error::ClientError;
use crate::event::ExistingEvent;

/// Token pair returned by `GET /auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: i64,
}

impl AuthToken {
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

/// How requests to the backend are authorised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Access token from `/auth`
    Bearer(String),
    /// Static API key
    ApiKey(String),
}

impl Credential {
    #[must_use]
    pub fn header_value(&self) -> String {
        match self {
            Self::Bearer(token) => format!("Bearer {token}"),
            Self::ApiKey(key) => format!("Key {key}"),
        }
    }
}

/// Backend API client.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    user: String,
    password: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: &CheckConfig) -> Result<Self, ClientError> {
        let backend = &config.backend;
        Ok(Self {
            base_url: backend.base_url(),
            user: backend.user.clone(),
            password: backend.password.clone(),
            api_key: backend.api_key.clone(),
            client: Self::build_client(backend, config.timeout)?,
        })
    }

    fn build_client(
        backend: &BackendConfig,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Client, ClientError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if backend.secure {
            if let Some(pem) = &backend.trusted_ca_pem {
                for cert in reqwest::Certificate::from_pem_bundle(pem)? {
                    builder = builder.add_root_certificate(cert);
                }
            }
            builder = builder.danger_accept_invalid_certs(backend.insecure_skip_verify);
        }
        Ok(builder.build()?)
    }

    /// Static API key if configured, otherwise a fresh access token.
    pub async fn credential(&self) -> Result<Credential, ClientError> {
        match &self.api_key {
            Some(key) => Ok(Credential::ApiKey(key.clone())),
            None => Ok(Credential::Bearer(self.authenticate().await?.access_token)),
        }
    }

    /// Exchange basic credentials for an access token.
    pub async fn authenticate(&self) -> Result<AuthToken, ClientError> {
        let url = format!("{}/auth", self.base_url);
        debug!(url = %url, user = %self.user, "Authenticating with backend");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if body.starts_with(b"Unauthorized") {
            return Err(ClientError::Unauthorized(self.user.clone()));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                method: "GET",
                url,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let token: AuthToken = decode_json(&url, &body)?;
        debug!(expires_at = ?token.expires_at(), "Backend token acquired");
        Ok(token)
    }

    /// List the events of a namespace.
    pub async fn fetch_events(
        &self,
        credential: &Credential,
        namespace: &str,
    ) -> Result<Vec<ExistingEvent>, ClientError> {
        let url = format!("{}/api/core/v2/namespaces/{namespace}/events", self.base_url);
        debug!(url = %url, "Fetching backend events");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, credential.header_value())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let response = ensure_success("GET", &url, response).await?;
        let body = response.bytes().await?;
        let events: Vec<ExistingEvent> = decode_json(&url, &body)?;

        info!(count = events.len(), namespace = %namespace, "Fetched backend events");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckOptions;

    #[test]
    fn test_credential_header() {
        assert_eq!(
            Credential::Bearer("tok".into()).header_value(),
            "Bearer tok"
        );
        assert_eq!(Credential::ApiKey("k".into()).header_value(), "Key k");
    }

    #[test]
    fn test_secure_base_url() {
        let options = CheckOptions {
            secure: true,
            api_backend_host: "sensu.example.com".to_string(),
            api_backend_port: 4242,
            ..CheckOptions::default()
        };
        let config = CheckConfig::from_options(&options).unwrap();
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://sensu.example.com:4242");
    }

    #[tokio::test]
    async fn test_static_key_skips_authentication() {
        let options = CheckOptions {
            api_backend_key: "secret".to_string(),
            // Unroutable: any auth attempt would fail
            api_backend_host: "192.0.2.1".to_string(),
            ..CheckOptions::default()
        };
        let config = CheckConfig::from_options(&options).unwrap();
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(
            client.credential().await.unwrap(),
            Credential::ApiKey("secret".to_string())
        );
    }

    #[test]
    fn test_token_expiry() {
        let token: AuthToken = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_at":1700000000}"#,
        )
        .unwrap();
        assert_eq!(token.expires_at().unwrap().timestamp(), 1_700_000_000);
    }
}
