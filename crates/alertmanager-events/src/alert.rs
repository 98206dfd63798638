//! Alert types as returned by the Alertmanager v2 API.
//!
//! Reference: `GET /api/v2/alerts` (`GettableAlert`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label and annotation maps. Ordered so rendered output and payloads are stable.
pub type Labels = BTreeMap<String, String>;

/// Label holding the alert name.
pub const ALERTNAME_LABEL: &str = "alertname";

/// Individual alert from the Alertmanager alert list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Alert labels
    #[serde(default)]
    pub labels: Labels,
    /// Alert annotations
    #[serde(default)]
    pub annotations: Labels,
    /// Stable identifier for this alert instance
    #[serde(default)]
    pub fingerprint: String,
    /// Processing status inside Alertmanager
    #[serde(default)]
    pub status: AlertStatus,
    /// Link back to the Prometheus expression that fired
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
}

/// Alertmanager status block of an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AlertStatus {
    #[serde(default)]
    pub state: AlertState,
}

/// Alert state. Only `active` alerts become Sensu events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Active,
    Suppressed,
    Unprocessed,
    #[default]
    #[serde(other)]
    Other,
}

impl AlertState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suppressed => "suppressed",
            Self::Unprocessed => "unprocessed",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Alert {
    /// Get the alert name, if the alert carries one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.get(ALERTNAME_LABEL).map(String::as_str)
    }

    /// Check if this alert is active (neither silenced nor inhibited).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.state == AlertState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_gettable_alert() {
        let raw = r#"{
            "labels": {"alertname": "TargetDown", "namespace": "monitoring"},
            "annotations": {"summary": "down"},
            "fingerprint": "abc123",
            "status": {"state": "active", "silencedBy": [], "inhibitedBy": []},
            "generatorURL": "http://prometheus:9090/graph?g0.expr=up",
            "receivers": [{"name": "sensu"}],
            "startsAt": "2024-01-01T00:00:00Z"
        }"#;

        let alert: Alert = serde_json::from_str(raw).unwrap();
        assert_eq!(alert.name(), Some("TargetDown"));
        assert_eq!(alert.fingerprint, "abc123");
        assert!(alert.is_active());
        assert_eq!(alert.generator_url, "http://prometheus:9090/graph?g0.expr=up");
    }

    #[test]
    fn test_unknown_state_is_not_active() {
        let alert: Alert =
            serde_json::from_str(r#"{"labels": {}, "status": {"state": "pending"}}"#).unwrap();
        assert_eq!(alert.status.state, AlertState::Other);
        assert!(!alert.is_active());

        let suppressed: Alert =
            serde_json::from_str(r#"{"status": {"state": "suppressed"}}"#).unwrap();
        assert_eq!(suppressed.status.state.to_string(), "suppressed");
        assert!(suppressed.name().is_none());
    }
}
