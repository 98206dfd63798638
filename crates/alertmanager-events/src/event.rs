//! Sensu event payloads.
//!
//! [`EventRecord`] is what we POST to the agent API; [`ExistingEvent`] is what
//! the backend API returns when listing a namespace's events.

use std::fmt::Write as _;

use serde::{Deserialize, Deserializer, Serialize};

use crate::alert::{Alert, Labels, ALERTNAME_LABEL};
use crate::config::{CheckConfig, OWNER_VALUE, PLUGIN_NAME};
use crate::identity::{alertmanager_link, remove_special_characters, DerivedIdentity, FINGERPRINT_LABEL};

/// Check status sent with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Alert no longer firing
    Resolved,
    /// Alert firing
    Critical,
}

impl EventStatus {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Resolved => 0,
            Self::Critical => 2,
        }
    }
}

/// Outbound event, in the agent API's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub check: CheckPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPayload {
    pub output: String,
    pub command: String,
    pub status: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy_entity_name: String,
    #[serde(default)]
    pub subscriptions: Vec<String>,
    #[serde(default)]
    pub handlers: Vec<String>,
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub created_by: String,
}

impl EventRecord {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.check.metadata.name
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.check.proxy_entity_name
    }

    #[must_use]
    pub fn status(&self) -> u32 {
        self.check.status
    }
}

/// Assembles outbound events from derived identities.
#[derive(Debug, Clone, Copy)]
pub struct EventBuilder<'a> {
    config: &'a CheckConfig,
}

impl<'a> EventBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a CheckConfig) -> Self {
        Self { config }
    }

    /// Build the payload for one identity. Never fails.
    #[must_use]
    pub fn build(&self, identity: &DerivedIdentity, output: String, status: EventStatus) -> EventRecord {
        EventRecord {
            check: CheckPayload {
                output,
                command: remove_special_characters(&identity.alert_name),
                status: status.code(),
                proxy_entity_name: identity.entity_name.clone(),
                subscriptions: vec![format!("entity:{}", self.config.agent_entity)],
                handlers: self.config.handlers.clone(),
                metadata: ObjectMeta {
                    name: remove_special_characters(&identity.event_name),
                    namespace: self.config.namespace.clone(),
                    labels: identity.labels.clone(),
                    annotations: identity.annotations.clone(),
                    created_by: PLUGIN_NAME.to_string(),
                },
            },
        }
    }

    /// Build the resolving payload for an event whose alert disappeared.
    #[must_use]
    pub fn build_close(&self, event: &ExistingEvent) -> EventRecord {
        let identity = DerivedIdentity {
            alert_name: event
                .check
                .metadata
                .labels
                .get(ALERTNAME_LABEL)
                .cloned()
                .unwrap_or_default(),
            event_name: event.name().to_string(),
            entity_name: event.check.proxy_entity_name.clone(),
            cluster: None,
            labels: event.check.metadata.labels.clone(),
            annotations: event.check.metadata.annotations.clone(),
        };
        let output = format!("Resolved Automatically \n {}", event.check.output);
        self.build(&identity, output, EventStatus::Resolved)
    }

    /// Human-readable check output for an alert.
    #[must_use]
    pub fn render_output(&self, alert: &Alert, alert_name: &str) -> String {
        let mut output = String::from("Labels:\n");
        for (key, value) in &alert.labels {
            let _ = writeln!(output, " - {key}: {value}");
        }
        output.push_str("Annotations:\n");
        for (key, value) in &alert.annotations {
            let _ = writeln!(output, " - {key}: {value}");
        }
        output.push_str("Alert Manager:\n");
        let _ = writeln!(output, " - status: {}", alert.status.state);
        if let Some(external_url) = &self.config.external_url {
            let _ = writeln!(output, " - source: {}", alertmanager_link(external_url, alert_name));
        }
        let _ = writeln!(output, "Prometheus:\n - source: {}", alert.generator_url);
        output
    }
}

/// Event as listed by the backend API. Only the fields we reconcile on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExistingEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: LabelsMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entity: ExistingEntity,
    #[serde(default, deserialize_with = "null_as_default")]
    pub check: ExistingCheck,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LabelsMeta {
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExistingEntity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: LabelsMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExistingCheck {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: ExistingCheckMeta,
    #[serde(default)]
    pub proxy_entity_name: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub status: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExistingCheckMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Labels,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: Labels,
}

impl ExistingEvent {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.check.metadata.name
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.check.proxy_entity_name
    }

    /// Fingerprint of the alert that created this event.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.check
            .metadata
            .labels
            .get(FINGERPRINT_LABEL)
            .map(String::as_str)
    }

    /// Whether this check was created by us.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.check
            .metadata
            .labels
            .get(PLUGIN_NAME)
            .is_some_and(|value| value == OWNER_VALUE)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.check.status == 0
    }

    /// Whether `key=value` appears in the event, entity or check labels.
    #[must_use]
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        [
            &self.metadata.labels,
            &self.entity.metadata.labels,
            &self.check.metadata.labels,
        ]
        .into_iter()
        .any(|labels| labels.get(key).is_some_and(|v| v == value))
    }
}

/// The backend serialises empty maps and objects as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use crate::config::CheckOptions;
    use crate::identity::derive_identity;

    fn config() -> CheckConfig {
        let options = CheckOptions {
            sensu_agent_entity: "agent-1".to_string(),
            sensu_handler: "pagerduty,slack".to_string(),
            sensu_namespace: "prod".to_string(),
            ..CheckOptions::default()
        };
        CheckConfig::from_options(&options).unwrap()
    }

    fn alert() -> Alert {
        let mut alert = Alert {
            fingerprint: "abc123".to_string(),
            generator_url: "http://prometheus:9090/graph".to_string(),
            ..Alert::default()
        };
        alert.labels.insert("alertname".into(), "TargetDown".into());
        alert.labels.insert("namespace".into(), "monitoring".into());
        alert.labels.insert("job_name".into(), "node-exporter".into());
        alert.annotations.insert("summary".into(), "Target is down".into());
        alert.status.state = AlertState::Active;
        alert
    }

    #[test]
    fn test_build_create_payload() {
        let config = config();
        let builder = EventBuilder::new(&config);
        let alert = alert();
        let identity = derive_identity(&alert, &config);

        let event = builder.build(&identity, "out".to_string(), EventStatus::Critical);
        assert_eq!(event.name(), "TargetDown-monitoring-node-exporter");
        assert_eq!(event.entity(), "node-exporter");
        assert_eq!(event.status(), 2);
        assert_eq!(event.check.command, "TargetDown");
        assert_eq!(event.check.handlers, vec!["pagerduty", "slack"]);
        assert_eq!(event.check.subscriptions, vec!["entity:agent-1"]);
        assert_eq!(event.check.metadata.namespace, "prod");
        assert_eq!(event.check.metadata.created_by, PLUGIN_NAME);
    }

    #[test]
    fn test_empty_handler_config_yields_no_handlers() {
        let options = CheckOptions {
            sensu_handler: String::new(),
            ..CheckOptions::default()
        };
        let config = CheckConfig::from_options(&options).unwrap();
        let identity = derive_identity(&alert(), &config);
        let event = EventBuilder::new(&config).build(&identity, String::new(), EventStatus::Critical);
        assert!(event.check.handlers.is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let config = config();
        let identity = derive_identity(&alert(), &config);
        let event = EventBuilder::new(&config).build(&identity, "out".into(), EventStatus::Critical);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["check"]["proxy_entity_name"], "node-exporter");
        assert_eq!(json["check"]["metadata"]["name"], "TargetDown-monitoring-node-exporter");
        assert_eq!(json["check"]["metadata"]["labels"]["fingerprint"], "abc123");
        assert_eq!(json["check"]["metadata"]["created_by"], PLUGIN_NAME);
    }

    #[test]
    fn test_render_output() {
        let mut config = config();
        config.external_url = Some("http://alertmanager:9093".to_string());
        let output = EventBuilder::new(&config).render_output(&alert(), "TargetDown");

        assert!(output.starts_with("Labels:\n"));
        assert!(output.contains(" - job_name: node-exporter\n"));
        assert!(output.contains("Annotations:\n - summary: Target is down\n"));
        assert!(output.contains(" - status: active\n"));
        assert!(output.contains(" - source: http://alertmanager:9093/#/alerts?"));
        assert!(output.ends_with("Prometheus:\n - source: http://prometheus:9090/graph\n"));
    }

    #[test]
    fn test_deserialize_existing_event_with_nulls() {
        let raw = r#"{
            "metadata": {"namespace": "default", "labels": null},
            "entity": {"metadata": {"name": "agent-1", "labels": {"cluster": "k8s-dev"}}},
            "check": {
                "metadata": {
                    "name": "TargetDown-monitoring-node-exporter",
                    "labels": {"sensu-alertmanager-events": "owner", "fingerprint": "abc123", "alertname": "TargetDown"},
                    "annotations": null
                },
                "proxy_entity_name": "node-exporter",
                "output": "previous",
                "status": 2
            }
        }"#;
        let event: ExistingEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_owned());
        assert!(!event.is_resolved());
        assert_eq!(event.fingerprint(), Some("abc123"));
        assert!(event.has_label("cluster", "k8s-dev"));
        assert!(!event.has_label("cluster", "k8s-prod"));
        assert!(event.check.metadata.annotations.is_empty());
    }

    #[test]
    fn test_build_close_payload() {
        let config = config();
        let mut existing = ExistingEvent::default();
        existing.check.metadata.name = "TargetDown-monitoring-node-exporter".into();
        existing.check.metadata.labels.insert("alertname".into(), "TargetDown".into());
        existing.check.metadata.labels.insert(FINGERPRINT_LABEL.into(), "abc123".into());
        existing.check.proxy_entity_name = "node-exporter".into();
        existing.check.output = "Labels: ...".into();
        existing.check.status = 2;

        let event = EventBuilder::new(&config).build_close(&existing);
        assert_eq!(event.status(), 0);
        assert_eq!(event.name(), "TargetDown-monitoring-node-exporter");
        assert_eq!(event.entity(), "node-exporter");
        assert_eq!(event.check.command, "TargetDown");
        assert_eq!(event.check.output, "Resolved Automatically \n Labels: ...");
        assert_eq!(event.check.metadata.labels[FINGERPRINT_LABEL], "abc123");
    }
}
