//! One check run.
//!
//! Fetches the alert list once, then runs two branches concurrently:
//! - create: derive an identity per active alert and submit a critical event;
//! - close (auto-close only): list our open events on the backend and resolve
//!   those whose alert fingerprint is gone.
//!
//! Both branches finish before the result is mapped to a check state. Hard
//! errors outrank create failures, which outrank close failures.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::alert::Alert;
use crate::clients::{AgentApiSink, AlertmanagerClient, BackendClient, EventSink};
use crate::config::CheckConfig;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{CheckError, ClientError, ConfigError};
use crate::event::{EventBuilder, EventRecord, EventStatus};
use crate::identity::derive_identity;
use crate::reconcile::Reconciler;

/// Sensu/Nagios check state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckState {
    Ok,
    Warning,
    Critical,
}

impl CheckState {
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    /// Alerts left after label selection
    pub alerts: usize,
    pub created: DispatchReport,
    /// Backend events listed, when auto-close ran
    pub events: Option<usize>,
    pub closed: DispatchReport,
}

impl CheckSummary {
    /// Aggregate per-item failures. Create failures come first.
    pub fn verdict(&self) -> Result<(), CheckError> {
        if self.created.failed > 0 {
            return Err(CheckError::CreateFailures(self.created.failed));
        }
        if self.closed.failed > 0 {
            return Err(CheckError::CloseFailures(self.closed.failed));
        }
        Ok(())
    }
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} alerts, {} events sent",
            self.alerts, self.created.submitted
        )?;
        if let Some(events) = self.events {
            write!(f, ", {events} events checked, {} closed", self.closed.submitted)?;
        }
        Ok(())
    }
}

/// Final state and status line of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub state: CheckState,
    pub message: String,
}

impl CheckOutcome {
    #[must_use]
    pub fn from_result(result: &Result<CheckSummary, CheckError>) -> Self {
        match result {
            Err(e) => Self {
                state: CheckState::Critical,
                message: e.to_string(),
            },
            Ok(summary) => match summary.verdict() {
                Err(e @ CheckError::CloseFailures(_)) => Self {
                    state: CheckState::Warning,
                    message: e.to_string(),
                },
                Err(e) => Self {
                    state: CheckState::Critical,
                    message: e.to_string(),
                },
                Ok(()) => Self {
                    state: CheckState::Ok,
                    message: summary.to_string(),
                },
            },
        }
    }

    /// Configuration problems are reported as warnings.
    #[must_use]
    pub fn from_config_error(error: &ConfigError) -> Self {
        Self {
            state: CheckState::Warning,
            message: error.to_string(),
        }
    }
}

/// Runs checks against the configured collaborators.
pub struct Checker {
    config: CheckConfig,
    alertmanager: AlertmanagerClient,
    dispatcher: Dispatcher,
    backend: Option<BackendClient>,
}

impl Checker {
    /// Build a checker posting to the agent events API.
    pub fn from_config(config: CheckConfig) -> Result<Self, ClientError> {
        let sink = Arc::new(AgentApiSink::new(&config)?);
        Self::with_sink(config, sink)
    }

    /// Build a checker posting to a custom sink.
    pub fn with_sink(config: CheckConfig, sink: Arc<dyn EventSink>) -> Result<Self, ClientError> {
        let backend = if config.auto_close {
            Some(BackendClient::new(&config)?)
        } else {
            None
        };
        Ok(Self {
            alertmanager: AlertmanagerClient::new(&config)?,
            dispatcher: Dispatcher::new(sink),
            backend,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Fetch, select and process the current alerts.
    pub async fn run(&self) -> Result<CheckSummary, CheckError> {
        let alerts = self
            .alertmanager
            .fetch_alerts()
            .await
            .map_err(CheckError::FetchAlerts)?;
        let alerts = self.config.selector.filter(alerts);
        info!(count = alerts.len(), "Number of Alerts found");

        self.process(&alerts).await
    }

    /// Run the create and close branches over an already selected alert list.
    pub async fn process(&self, alerts: &[Alert]) -> Result<CheckSummary, CheckError> {
        let (created, closing) = tokio::join!(self.create_events(alerts), self.close_stale_events(alerts));
        let (events, closed) = closing?;

        Ok(CheckSummary {
            alerts: alerts.len(),
            created,
            events,
            closed,
        })
    }

    /// Payloads for every active, non-excluded alert.
    #[must_use]
    pub fn create_payloads(&self, alerts: &[Alert]) -> Vec<EventRecord> {
        let builder = EventBuilder::new(&self.config);

        alerts
            .iter()
            .filter_map(|alert| {
                let Some(alert_name) = alert.name() else {
                    debug!(fingerprint = %alert.fingerprint, "Alert without alertname, skipping");
                    return None;
                };
                if self.config.is_excluded_alert(alert_name) {
                    debug!(alert = %alert_name, "Alert excluded by name");
                    return None;
                }
                if !alert.is_active() {
                    info!(alert = %alert_name, state = %alert.status.state, "Not Sending Alert");
                    return None;
                }

                let identity = derive_identity(alert, &self.config);
                let output = builder.render_output(alert, &identity.alert_name);
                info!(
                    event = %identity.event_name,
                    entity = %identity.entity_name,
                    "Sending Alert"
                );
                Some(builder.build(&identity, output, EventStatus::Critical))
            })
            .collect()
    }

    async fn create_events(&self, alerts: &[Alert]) -> DispatchReport {
        if alerts.is_empty() {
            return DispatchReport::default();
        }
        let payloads = self.create_payloads(alerts);
        self.dispatcher.dispatch_create(payloads).await
    }

    async fn close_stale_events(
        &self,
        alerts: &[Alert],
    ) -> Result<(Option<usize>, DispatchReport), CheckError> {
        let Some(backend) = &self.backend else {
            return Ok((None, DispatchReport::default()));
        };

        let credential = backend
            .credential()
            .await
            .map_err(CheckError::Authenticate)?;
        let events = backend
            .fetch_events(&credential, &self.config.namespace)
            .await
            .map_err(CheckError::FetchEvents)?;
        info!(count = events.len(), "Number of Events found");

        let stale = Reconciler::new(&self.config.auto_close_labels).reconcile(alerts, &events);
        let builder = EventBuilder::new(&self.config);
        let payloads: Vec<EventRecord> = stale
            .into_iter()
            .map(|event| {
                info!(event = %event.name(), entity = %event.entity_name(), "Closing event");
                builder.build_close(event)
            })
            .collect();

        let report = self.dispatcher.dispatch_close(payloads).await;
        Ok((Some(events.len()), report))
    }
}
