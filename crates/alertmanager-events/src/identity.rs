//! Alert identity derivation.
//!
//! Turns one alert into a stable Sensu check name, a proxy entity name and an
//! enriched label/annotation set. Derivation is a pure function of the alert
//! and the configuration, so re-running on the same alert always yields the
//! same event name and downstream deduplication by name works.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::alert::{Alert, Labels};
use crate::config::{is_absolute_url, CheckConfig, EntityMode, OWNER_VALUE, PLUGIN_NAME};

pub const NAMESPACE_LABEL: &str = "namespace";
pub const NODE_LABEL: &str = "node";
pub const POD_LABEL: &str = "pod";
pub const FINGERPRINT_LABEL: &str = "fingerprint";

pub const PROMETHEUS_URL_ANNOTATION: &str = "prometheus_url";
pub const ALERTMANAGER_URL_ANNOTATION: &str = "alertmanager_url";
pub const PROMETHEUS_TARGETS_URL_ANNOTATION: &str = "prometheus_targets_url";

/// Workload labels consulted for the entity name, highest priority first.
pub const WORKLOAD_PRIORITY: [&str; 6] = [
    "job_name",
    "daemonset",
    "statefulset",
    "deployment",
    "service",
    NODE_LABEL,
];

/// Labels whose presence marks an alert as tied to a workload.
const WORKLOAD_HINTS: [&str; 7] = [
    "job_name",
    "statefulset",
    "daemonset",
    "deployment",
    "service",
    POD_LABEL,
    NODE_LABEL,
];

static SPECIAL_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.\-]+").unwrap());

/// Everything derived from one alert for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIdentity {
    /// Raw value of the `alertname` label
    pub alert_name: String,
    /// Sanitized Sensu check name
    pub event_name: String,
    /// Sensu proxy entity name. Empty when nothing could be derived.
    pub entity_name: String,
    /// Value of the configured cluster label, if present
    pub cluster: Option<String>,
    pub labels: Labels,
    pub annotations: Labels,
}

/// Facts gathered in the single label scan.
#[derive(Debug, Default)]
struct LabelScan<'a> {
    alert_name: &'a str,
    cluster: Option<&'a str>,
    namespace: Option<&'a str>,
    node: Option<&'a str>,
    has_workload_hint: bool,
}

impl<'a> LabelScan<'a> {
    fn new(labels: &'a Labels, cluster_label: Option<&str>) -> Self {
        let mut scan = Self::default();
        for (key, value) in labels {
            let key = key.as_str();
            if Some(key) == cluster_label {
                scan.cluster = Some(value.as_str());
            }
            match key {
                "alertname" => scan.alert_name = value.as_str(),
                NAMESPACE_LABEL => scan.namespace = Some(value.as_str()),
                NODE_LABEL => scan.node = Some(value.as_str()),
                _ => {}
            }
            if WORKLOAD_HINTS.contains(&key) {
                scan.has_workload_hint = true;
            }
        }
        scan
    }

    /// A node label always wins over a stray namespace label.
    fn is_namespaced(&self) -> bool {
        self.namespace.is_some() && self.node.is_none()
    }
}

/// Derive the identity of `alert` under `config`.
#[must_use]
pub fn derive_identity(alert: &Alert, config: &CheckConfig) -> DerivedIdentity {
    let scan = LabelScan::new(&alert.labels, config.cluster_label.as_deref());
    let workload = workload_name(&alert.labels, &scan);

    let mut labels = alert.labels.clone();
    labels.insert(PLUGIN_NAME.to_string(), OWNER_VALUE.to_string());
    labels.insert(FINGERPRINT_LABEL.to_string(), alert.fingerprint.clone());
    let labels = merge_string_maps(labels, &config.extra_labels);

    let mut annotations = rewrite_annotations(&alert.annotations, config);
    if is_absolute_url(&alert.generator_url) {
        annotations.insert(
            PROMETHEUS_URL_ANNOTATION.to_string(),
            alert.generator_url.clone(),
        );
    }
    if let Some(external_url) = config
        .external_url
        .as_deref()
        .filter(|url| is_absolute_url(url))
    {
        annotations.insert(
            ALERTMANAGER_URL_ANNOTATION.to_string(),
            alertmanager_link(external_url, scan.alert_name),
        );
    }
    if scan.alert_name == config.target_alertname {
        if let Some(targets) = prometheus_targets_url(&alert.generator_url) {
            annotations.insert(PROMETHEUS_TARGETS_URL_ANNOTATION.to_string(), targets);
        }
    }
    let annotations = merge_string_maps(annotations, &config.extra_annotations);

    let entity_name = match &config.entity_mode {
        EntityMode::Explicit(name) => name.clone(),
        EntityMode::ClusterLabel(_) => scan.cluster.unwrap_or_default().to_string(),
        EntityMode::Workload => workload.clone().unwrap_or_default(),
    };

    DerivedIdentity {
        alert_name: scan.alert_name.to_string(),
        event_name: event_name(&scan, workload.as_deref()),
        entity_name,
        cluster: scan.cluster.map(str::to_string),
        labels,
        annotations,
    }
}

/// Workload-derived entity: first present workload label for namespaced
/// alerts (falling back to the pod), otherwise the node.
fn workload_name(labels: &Labels, scan: &LabelScan<'_>) -> Option<String> {
    if scan.is_namespaced() {
        WORKLOAD_PRIORITY
            .iter()
            .find_map(|key| labels.get(*key))
            .or_else(|| labels.get(POD_LABEL))
            .cloned()
    } else {
        scan.node.map(str::to_string)
    }
}

fn event_name(scan: &LabelScan<'_>, workload: Option<&str>) -> String {
    let name = match (scan.is_namespaced(), scan.namespace, scan.node) {
        (true, Some(namespace), _) => match workload.filter(|_| scan.has_workload_hint) {
            Some(workload) => format!("{}-{namespace}-{workload}", scan.alert_name),
            None => format!("{}-{namespace}", scan.alert_name),
        },
        (false, _, Some(node)) if !node.is_empty() => format!("{}-{node}", scan.alert_name),
        _ => scan.alert_name.to_string(),
    };
    remove_special_characters(&name)
}

fn rewrite_annotations(annotations: &Labels, config: &CheckConfig) -> Labels {
    if config.rewrite.is_empty() {
        return annotations.clone();
    }
    annotations
        .iter()
        .map(|(key, value)| {
            let key = config.rewrite.rewrite(key).unwrap_or(key);
            (key.to_string(), value.clone())
        })
        .collect()
}

/// Deep link into the Alertmanager UI filtered by alert name.
#[must_use]
pub fn alertmanager_link(external_url: &str, alert_name: &str) -> String {
    let filter = urlencoding::encode(&format!("{{alertname=\"{alert_name}\"}}")).into_owned();
    format!(
        "{}/#/alerts?silenced=false&inhibited=false&active=true&filter={filter}",
        external_url.trim_end_matches('/')
    )
}

/// Prometheus targets page derived from an alert's generator URL.
#[must_use]
pub fn prometheus_targets_url(generator_url: &str) -> Option<String> {
    if !is_absolute_url(generator_url) {
        return None;
    }
    let mut url = Url::parse(generator_url).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    url.set_path("targets");
    Some(url.to_string())
}

/// Replace each run of characters outside `[A-Za-z0-9.-]` with one `-`,
/// then strip one leading and one trailing `-`.
#[must_use]
pub fn remove_special_characters(s: &str) -> String {
    let replaced = SPECIAL_CHARACTERS.replace_all(s, "-");
    let mut value: &str = &replaced;
    value = value.strip_prefix('-').unwrap_or(value);
    value = value.strip_suffix('-').unwrap_or(value);
    value.to_string()
}

/// Merge `right` into `left` without overwriting keys already in `left`.
#[must_use]
pub fn merge_string_maps(mut left: Labels, right: &Labels) -> Labels {
    for (key, value) in right {
        left.entry(key.clone()).or_insert_with(|| value.clone());
    }
    left
}
