//! Sensu agent events API sink.

use async_trait::async_trait;
use tracing::debug;

use super::{ensure_success, http_client, EventSink};
use crate::config::CheckConfig;
use crate::error::ClientError;
use crate::event::EventRecord;

/// POSTs events to the local agent's `/events` endpoint.
#[derive(Debug, Clone)]
pub struct AgentApiSink {
    url: String,
    client: reqwest::Client,
}

impl AgentApiSink {
    pub fn new(config: &CheckConfig) -> Result<Self, ClientError> {
        Ok(Self {
            url: config.agent_api_url.clone(),
            client: http_client(config.timeout)?,
        })
    }
}

#[async_trait]
impl EventSink for AgentApiSink {
    fn name(&self) -> &'static str {
        "agent-api"
    }

    async fn submit(&self, event: &EventRecord) -> Result<(), ClientError> {
        debug!(
            sink = self.name(),
            event = %event.name(),
            status = event.status(),
            "Posting event"
        );

        let response = self.client.post(&self.url).json(event).send().await?;
        ensure_success("POST", &self.url, response).await?;
        Ok(())
    }
}
