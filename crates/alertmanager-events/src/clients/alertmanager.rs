//! Alertmanager v2 alert list client.

use tracing::{debug, info};

use super::{decode_json, ensure_success, http_client};
use crate::alert::Alert;
use crate::config::CheckConfig;
use crate::error::ClientError;

/// Client for `GET /api/v2/alerts`.
#[derive(Debug, Clone)]
pub struct AlertmanagerClient {
    url: String,
    client: reqwest::Client,
}

impl AlertmanagerClient {
    pub fn new(config: &CheckConfig) -> Result<Self, ClientError> {
        Ok(Self {
            url: config.alertmanager_api_url.clone(),
            client: http_client(config.timeout)?,
        })
    }

    /// Fetch the current alert list.
    pub async fn fetch_alerts(&self) -> Result<Vec<Alert>, ClientError> {
        debug!(url = %self.url, "Fetching Alertmanager alerts");

        let response = self.client.get(&self.url).send().await?;
        let response = ensure_success("GET", &self.url, response).await?;
        let body = response.bytes().await?;
        let alerts: Vec<Alert> = decode_json(&self.url, &body)?;

        info!(count = alerts.len(), "Fetched Alertmanager alerts");
        Ok(alerts)
    }
}
