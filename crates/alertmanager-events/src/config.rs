//! Check configuration.
//!
//! Raw flags ([`CheckOptions`]) are parsed by clap and validated exactly once
//! into an immutable [`CheckConfig`] that every component borrows. Validation
//! happens before any network activity so shape errors surface as warnings.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use reqwest::Url;
use tracing::{debug, warn};

use crate::alert::Labels;
use crate::error::ConfigError;

/// Plugin name. Used as owner-marker label key and as `created_by`.
pub const PLUGIN_NAME: &str = "sensu-alertmanager-events";

/// Value of the owner-marker label.
pub const OWNER_VALUE: &str = "owner";

pub const DEFAULT_ALERTMANAGER_API_URL: &str =
    "http://alertmanager-main.monitoring:9093/api/v2/alerts";
pub const DEFAULT_AGENT_API_URL: &str = "http://127.0.0.1:3031/events";
pub const DEFAULT_EXCLUDE_ALERTS: &str = "Watchdog,";
pub const DEFAULT_TARGET_ALERTNAME: &str = "TargetDown";
pub const DEFAULT_SENSU_NAMESPACE: &str = "default";
pub const DEFAULT_SENSU_HANDLER: &str = "default,";
pub const DEFAULT_BACKEND_USER: &str = "admin";
pub const DEFAULT_BACKEND_PASS: &str = "P@ssw0rd!";
pub const DEFAULT_BACKEND_HOST: &str = "127.0.0.1";
pub const DEFAULT_BACKEND_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Command line / environment options, as typed by the operator.
#[derive(Debug, Clone, Args)]
pub struct CheckOptions {
    /// The URL for the Agent to connect to Alert Manager
    #[arg(short = 'a', long, env = "ALERT_MANAGER_API_URL", default_value = DEFAULT_ALERTMANAGER_API_URL)]
    pub alert_manager_api_url: String,

    /// The URL for the Agent API used to send events
    #[arg(short = 'A', long, env = "AGENT_API_URL", default_value = DEFAULT_AGENT_API_URL)]
    pub agent_api_url: String,

    /// Alert Manager alerts to be excluded. Split by comma
    #[arg(short = 'x', long, env = "ALERT_MANAGER_EXCLUDE_ALERT_LIST", default_value = DEFAULT_EXCLUDE_ALERTS)]
    pub alert_manager_exclude_alert_list: String,

    /// Alert Manager External URL
    #[arg(short = 'e', long, env = "ALERT_MANAGER_EXTERNAL_URL", default_value = "")]
    pub alert_manager_external_url: String,

    /// Alert Manager label that represents a cluster entity inside Sensu
    #[arg(short = 'c', long, env = "ALERT_MANAGER_CLUSTER_LABEL_ENTITY", default_value = "")]
    pub alert_manager_cluster_label_entity: String,

    /// Label selectors for alerts (e.g. alertname=TargetDown,environment=dev)
    #[arg(short = 'l', long, env = "ALERT_MANAGER_LABEL_SELECTORS", default_value = "")]
    pub alert_manager_label_selectors: String,

    /// Labels that exclude alerts (e.g. alertname=TargetDown,environment=dev)
    #[arg(short = 'L', long, env = "ALERT_MANAGER_EXCLUDE_LABELS", default_value = "")]
    pub alert_manager_exclude_labels: String,

    /// Alert name for Targets in prometheus. It creates a link in annotation prometheus_targets_url
    #[arg(short = 'T', long, env = "ALERT_MANAGER_TARGET_ALERTNAME", default_value = DEFAULT_TARGET_ALERTNAME)]
    pub alert_manager_target_alertname: String,

    /// Overwrite Proxy Entity in Sensu
    #[arg(short = 'E', long, env = "SENSU_PROXY_ENTITY", default_value = "")]
    pub sensu_proxy_entity: String,

    /// Agent entity name used in event subscriptions
    #[arg(long, env = "HOSTNAME", default_value = "")]
    pub sensu_agent_entity: String,

    /// Sensu namespace used by events
    #[arg(short = 'n', long, env = "SENSU_NAMESPACE", default_value = DEFAULT_SENSU_NAMESPACE)]
    pub sensu_namespace: String,

    /// Sensu handlers for events. Split by commas
    #[arg(short = 'H', long, env = "SENSU_HANDLER", default_value = DEFAULT_SENSU_HANDLER)]
    pub sensu_handler: String,

    /// Extra check labels. Format: labelName=labelValue,extraLabel=extraValue
    #[arg(long, env = "SENSU_EXTRA_LABEL", default_value = "")]
    pub sensu_extra_label: String,

    /// Extra check annotations. Format: annotationName=annotationValue,extraTwo=extraValue
    #[arg(long, env = "SENSU_EXTRA_ANNOTATION", default_value = "")]
    pub sensu_extra_annotation: String,

    /// Rewrite alert annotation keys. Format: opsgenie_priority=sensu.io/plugins/sensu-opsgenie-handler/config/priority
    #[arg(long, default_value = "")]
    pub rewrite_annotation: String,

    /// Resolve Sensu events whose alert is no longer in Alert Manager
    #[arg(short = 'C', long)]
    pub auto_close_sensu: bool,

    /// Only auto-close events carrying all these labels, e.g. {"cluster":"k8s-dev"}
    #[arg(long, env = "AUTO_CLOSE_SENSU_LABEL", default_value = "")]
    pub auto_close_sensu_label: String,

    /// Sensu Go Backend API User
    #[arg(short = 'u', long, env = "SENSU_API_USER", default_value = DEFAULT_BACKEND_USER)]
    pub api_backend_user: String,

    /// Sensu Go Backend API Password
    #[arg(short = 'P', long, env = "SENSU_API_PASSWORD", default_value = DEFAULT_BACKEND_PASS, hide_env_values = true)]
    pub api_backend_pass: String,

    /// Sensu Go Backend API Key
    #[arg(short = 'k', long, env = "SENSU_API_KEY", default_value = "", hide_env_values = true)]
    pub api_backend_key: String,

    /// Sensu Go Backend API Host (e.g. 'sensu-backend.example.com')
    #[arg(short = 'B', long, default_value = DEFAULT_BACKEND_HOST)]
    pub api_backend_host: String,

    /// Sensu Go Backend API Port (e.g. 4242)
    #[arg(short = 'p', long, default_value_t = DEFAULT_BACKEND_PORT)]
    pub api_backend_port: u16,

    /// Use TLS connection to API
    #[arg(short = 's', long)]
    pub secure: bool,

    /// Skip TLS certificate verification (not recommended!)
    #[arg(short = 'i', long)]
    pub insecure_skip_verify: bool,

    /// TLS CA certificate bundle in PEM format
    #[arg(short = 't', long)]
    pub trusted_ca_file: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            alert_manager_api_url: DEFAULT_ALERTMANAGER_API_URL.to_string(),
            agent_api_url: DEFAULT_AGENT_API_URL.to_string(),
            alert_manager_exclude_alert_list: DEFAULT_EXCLUDE_ALERTS.to_string(),
            alert_manager_external_url: String::new(),
            alert_manager_cluster_label_entity: String::new(),
            alert_manager_label_selectors: String::new(),
            alert_manager_exclude_labels: String::new(),
            alert_manager_target_alertname: DEFAULT_TARGET_ALERTNAME.to_string(),
            sensu_proxy_entity: String::new(),
            sensu_agent_entity: String::new(),
            sensu_namespace: DEFAULT_SENSU_NAMESPACE.to_string(),
            sensu_handler: DEFAULT_SENSU_HANDLER.to_string(),
            sensu_extra_label: String::new(),
            sensu_extra_annotation: String::new(),
            rewrite_annotation: String::new(),
            auto_close_sensu: false,
            auto_close_sensu_label: String::new(),
            api_backend_user: DEFAULT_BACKEND_USER.to_string(),
            api_backend_pass: DEFAULT_BACKEND_PASS.to_string(),
            api_backend_key: String::new(),
            api_backend_host: DEFAULT_BACKEND_HOST.to_string(),
            api_backend_port: DEFAULT_BACKEND_PORT,
            secure: false,
            insecure_skip_verify: false,
            trusted_ca_file: None,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// How the Sensu proxy entity of an event is chosen. Selected once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMode {
    /// Operator-supplied entity name for every event
    Explicit(String),
    /// Value of this alert label (e.g. `cluster`)
    ClusterLabel(String),
    /// Kubernetes workload, node or pod derived from the alert labels
    Workload,
}

/// Ordered annotation key rewrite table. The first rule for a key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteRules(Vec<(String, String)>);

impl RewriteRules {
    /// Parse `from=to,from2=to2`. Pairs with an empty side are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let rules = raw
            .split(',')
            .filter_map(|pair| {
                let mut parts = pair.split('=');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(from), Some(to), None) if !from.is_empty() && !to.is_empty() => {
                        Some((from.to_string(), to.to_string()))
                    }
                    _ => None,
                }
            })
            .collect();
        Self(rules)
    }

    /// Target key for `key`, if a rule maps it.
    #[must_use]
    pub fn rewrite(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(from, _)| from == key)
            .map(|(_, to)| to.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Connection settings for the Sensu backend API.
#[derive(Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub user: String,
    pub password: String,
    /// Static API key. When set, no authentication round-trip is made.
    pub api_key: Option<String>,
    /// Trusted CA bundle (PEM), already checked to parse.
    pub trusted_ca_pem: Option<Vec<u8>>,
    pub insecure_skip_verify: bool,
}

impl BackendConfig {
    /// `http(s)://host:port`
    #[must_use]
    pub fn base_url(&self) -> String {
        let protocol = if self.secure { "https" } else { "http" };
        format!("{protocol}://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("trusted_ca", &self.trusted_ca_pem.is_some())
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish_non_exhaustive()
    }
}

/// Validated, immutable configuration for one check run.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub alertmanager_api_url: String,
    pub agent_api_url: String,
    /// Alert names never turned into events
    pub exclude_alerts: Vec<String>,
    /// Alertmanager UI base URL for deep links
    pub external_url: Option<String>,
    /// Alert label copied into the identity as cluster name
    pub cluster_label: Option<String>,
    pub selector: crate::selector::LabelSelector,
    pub target_alertname: String,
    pub entity_mode: EntityMode,
    pub agent_entity: String,
    pub namespace: String,
    pub handlers: Vec<String>,
    pub extra_labels: Labels,
    pub extra_annotations: Labels,
    pub rewrite: RewriteRules,
    pub auto_close: bool,
    /// Auxiliary predicate for auto-close. Empty means no predicate.
    pub auto_close_labels: Labels,
    pub backend: BackendConfig,
    pub timeout: Duration,
}

impl CheckConfig {
    /// Validate raw options into a configuration.
    pub fn from_options(options: &CheckOptions) -> Result<Self, ConfigError> {
        require_absolute_url("alert-manager-api-url", &options.alert_manager_api_url)?;
        require_absolute_url("agent-api-url", &options.agent_api_url)?;

        let selector = crate::selector::LabelSelector::new(
            parse_pairs_option(
                "alert-manager-label-selectors",
                "Label=Value",
                &options.alert_manager_label_selectors,
            )?,
            parse_pairs_option(
                "alert-manager-exclude-labels",
                "Label=Value",
                &options.alert_manager_exclude_labels,
            )?,
        );
        let extra_labels =
            parse_pairs_option("sensu-extra-label", "Label=Value", &options.sensu_extra_label)?;
        let extra_annotations = parse_pairs_option(
            "sensu-extra-annotation",
            "Annotation=Value",
            &options.sensu_extra_annotation,
        )?;

        if !options.rewrite_annotation.is_empty() && !options.rewrite_annotation.contains('=') {
            return Err(ConfigError::MalformedPairs {
                flag: "rewrite-annotation",
                expected: "Annotation=Value",
                value: options.rewrite_annotation.clone(),
            });
        }
        let rewrite = RewriteRules::parse(&options.rewrite_annotation);

        let auto_close_labels = if options.auto_close_sensu_label.is_empty() {
            Labels::new()
        } else {
            serde_json::from_str(&options.auto_close_sensu_label).map_err(|source| {
                ConfigError::AutoCloseLabel {
                    value: options.auto_close_sensu_label.clone(),
                    source,
                }
            })?
        };

        let trusted_ca_pem = match &options.trusted_ca_file {
            Some(path) => Some(load_trusted_ca(path)?),
            None => None,
        };

        let entity_mode = select_entity_mode(
            &options.sensu_proxy_entity,
            &options.alert_manager_cluster_label_entity,
        );

        let config = Self {
            alertmanager_api_url: options.alert_manager_api_url.clone(),
            agent_api_url: options.agent_api_url.clone(),
            exclude_alerts: split_list(&options.alert_manager_exclude_alert_list),
            external_url: non_empty(&options.alert_manager_external_url),
            cluster_label: non_empty(&options.alert_manager_cluster_label_entity),
            selector,
            target_alertname: options.alert_manager_target_alertname.clone(),
            entity_mode,
            agent_entity: options.sensu_agent_entity.clone(),
            namespace: options.sensu_namespace.clone(),
            handlers: split_list(&options.sensu_handler),
            extra_labels,
            extra_annotations,
            rewrite,
            auto_close: options.auto_close_sensu,
            auto_close_labels,
            backend: BackendConfig {
                host: options.api_backend_host.clone(),
                port: options.api_backend_port,
                secure: options.secure,
                user: options.api_backend_user.clone(),
                password: options.api_backend_pass.clone(),
                api_key: non_empty(&options.api_backend_key),
                trusted_ca_pem,
                insecure_skip_verify: options.insecure_skip_verify,
            },
            timeout: Duration::from_secs(options.timeout),
        };

        debug!(
            entity_mode = ?config.entity_mode,
            auto_close = config.auto_close,
            handlers = ?config.handlers,
            "Configuration validated"
        );

        Ok(config)
    }

    /// Whether `alert_name` is on the exclude list.
    #[must_use]
    pub fn is_excluded_alert(&self, alert_name: &str) -> bool {
        self.exclude_alerts.iter().any(|name| name == alert_name)
    }
}

/// Parse a `key=value,key2=value2` list. Segments without exactly one `=` are skipped.
#[must_use]
pub fn parse_label_arg(raw: &str) -> Labels {
    raw.split(',')
        .filter_map(|pair| {
            let mut parts = pair.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
                _ => None,
            }
        })
        .collect()
}

/// Whether `raw` parses as an absolute URL with a host.
#[must_use]
pub fn is_absolute_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| url.has_host())
}

fn parse_pairs_option(
    flag: &'static str,
    expected: &'static str,
    raw: &str,
) -> Result<Labels, ConfigError> {
    if raw.is_empty() {
        return Ok(Labels::new());
    }
    if !raw.contains('=') {
        return Err(ConfigError::MalformedPairs {
            flag,
            expected,
            value: raw.to_string(),
        });
    }
    Ok(parse_label_arg(raw))
}

fn require_absolute_url(flag: &'static str, raw: &str) -> Result<(), ConfigError> {
    if is_absolute_url(raw) {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            flag,
            value: raw.to_string(),
        })
    }
}

fn load_trusted_ca(path: &std::path::Path) -> Result<Vec<u8>, ConfigError> {
    let trusted_ca = |reason: String| ConfigError::TrustedCa {
        path: path.display().to_string(),
        reason,
    };

    let pem = std::fs::read(path).map_err(|e| trusted_ca(e.to_string()))?;
    let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| trusted_ca(e.to_string()))?;
    if certs.is_empty() {
        return Err(trusted_ca("no certificates found".to_string()));
    }
    Ok(pem)
}

fn select_entity_mode(proxy_entity: &str, cluster_label: &str) -> EntityMode {
    if !proxy_entity.is_empty() {
        if !cluster_label.is_empty() {
            warn!(
                proxy_entity = %proxy_entity,
                cluster_label = %cluster_label,
                "Both a proxy entity and a cluster label entity were given; using the proxy entity"
            );
        }
        return EntityMode::Explicit(proxy_entity.to_string());
    }
    if !cluster_label.is_empty() {
        return EntityMode::ClusterLabel(cluster_label.to_string());
    }
    EntityMode::Workload
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CheckConfig::from_options(&CheckOptions::default()).unwrap();
        assert_eq!(config.entity_mode, EntityMode::Workload);
        assert_eq!(config.handlers, vec!["default".to_string()]);
        assert_eq!(config.exclude_alerts, vec!["Watchdog".to_string()]);
        assert!(config.is_excluded_alert("Watchdog"));
        assert!(!config.is_excluded_alert("TargetDown"));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.backend.base_url(), "http://127.0.0.1:8080");
        assert!(config.external_url.is_none());
    }

    #[test]
    fn test_entity_mode_precedence() {
        let mut options = CheckOptions {
            alert_manager_cluster_label_entity: "cluster".to_string(),
            ..CheckOptions::default()
        };
        let config = CheckConfig::from_options(&options).unwrap();
        assert_eq!(
            config.entity_mode,
            EntityMode::ClusterLabel("cluster".to_string())
        );

        options.sensu_proxy_entity = "k8s-cluster".to_string();
        let config = CheckConfig::from_options(&options).unwrap();
        assert_eq!(
            config.entity_mode,
            EntityMode::Explicit("k8s-cluster".to_string())
        );
        assert_eq!(config.cluster_label.as_deref(), Some("cluster"));
    }

    #[test]
    fn test_malformed_extra_label_rejected() {
        let options = CheckOptions {
            sensu_extra_label: "no-equals-sign".to_string(),
            ..CheckOptions::default()
        };
        let err = CheckConfig::from_options(&options).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MalformedPairs {
                flag: "sensu-extra-label",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_rewrite_and_annotation_rejected() {
        let options = CheckOptions {
            sensu_extra_annotation: "runbook".to_string(),
            ..CheckOptions::default()
        };
        assert!(CheckConfig::from_options(&options).is_err());

        let options = CheckOptions {
            rewrite_annotation: "opsgenie_priority".to_string(),
            ..CheckOptions::default()
        };
        assert!(matches!(
            CheckConfig::from_options(&options).unwrap_err(),
            ConfigError::MalformedPairs {
                flag: "rewrite-annotation",
                ..
            }
        ));
    }

    #[test]
    fn test_auto_close_label_json() {
        let options = CheckOptions {
            auto_close_sensu_label: r#"{"cluster":"k8s-dev"}"#.to_string(),
            ..CheckOptions::default()
        };
        let config = CheckConfig::from_options(&options).unwrap();
        assert_eq!(
            config.auto_close_labels.get("cluster").map(String::as_str),
            Some("k8s-dev")
        );

        let options = CheckOptions {
            auto_close_sensu_label: "cluster=k8s-dev".to_string(),
            ..CheckOptions::default()
        };
        assert!(matches!(
            CheckConfig::from_options(&options).unwrap_err(),
            ConfigError::AutoCloseLabel { .. }
        ));
    }

    #[test]
    fn test_missing_trusted_ca_rejected() {
        let options = CheckOptions {
            trusted_ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..CheckOptions::default()
        };
        assert!(matches!(
            CheckConfig::from_options(&options).unwrap_err(),
            ConfigError::TrustedCa { .. }
        ));
    }

    #[test]
    fn test_invalid_alertmanager_url_rejected() {
        let options = CheckOptions {
            alert_manager_api_url: "alertmanager:9093".to_string(),
            ..CheckOptions::default()
        };
        assert!(matches!(
            CheckConfig::from_options(&options).unwrap_err(),
            ConfigError::InvalidUrl { .. }
        ));
    }

    #[test]
    fn test_parse_label_arg() {
        let labels = parse_label_arg("alertname=TargetDown,environment=dev,broken,a=b=c");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["alertname"], "TargetDown");
        assert_eq!(labels["environment"], "dev");
    }

    #[test]
    fn test_rewrite_rules_first_match_wins() {
        let rules = RewriteRules::parse(
            "opsgenie_priority=sensu.io/plugins/sensu-opsgenie-handler/config/priority,opsgenie_priority=other,=x,y=",
        );
        assert_eq!(
            rules.rewrite("opsgenie_priority"),
            Some("sensu.io/plugins/sensu-opsgenie-handler/config/priority")
        );
        assert_eq!(rules.rewrite("summary"), None);
        assert_eq!(rules.rewrite("y"), None);
    }

    #[test]
    fn test_is_absolute_url() {
        assert!(is_absolute_url("http://prometheus:9090/graph?g0.expr=up"));
        assert!(!is_absolute_url("/graph"));
        assert!(!is_absolute_url(""));
        assert!(!is_absolute_url("mailto:ops@example.com"));
    }
}
