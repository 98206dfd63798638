//! Alertmanager to Sensu bridge.
//!
//! Runs as a Sensu check: reads the active alerts from Alertmanager, turns
//! each one into a Sensu event posted to the local agent, and optionally
//! resolves events whose alert stopped firing.
//!
//! # Usage
//!
//! ```no_run
//! use alertmanager_events::{CheckConfig, CheckOptions, CheckOutcome, Checker};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = CheckConfig::from_options(&CheckOptions::default())?;
//! let checker = Checker::from_config(config)?;
//! let outcome = CheckOutcome::from_result(&checker.run().await);
//! println!("{}: {}", outcome.state, outcome.message);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`LabelSelector`] narrows the alert list by label include/exclude rules
//! - [`derive_identity`] maps an alert to a stable event name and entity
//! - [`EventBuilder`] assembles the outbound event payloads
//! - [`Dispatcher`] submits payloads concurrently to an [`EventSink`]
//! - [`Reconciler`] picks the owned events whose alert is gone
//! - [`Checker`] runs both branches and [`CheckOutcome`] maps the result to a
//!   check state

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod check;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod identity;
pub mod reconcile;
pub mod selector;

pub use alert::{Alert, AlertState, Labels};
pub use check::{CheckOutcome, CheckState, CheckSummary, Checker};
pub use clients::{AgentApiSink, AlertmanagerClient, BackendClient, Credential, EventSink};
pub use config::{CheckConfig, CheckOptions, EntityMode, PLUGIN_NAME};
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{CheckError, ClientError, ConfigError};
pub use event::{EventBuilder, EventRecord, EventStatus, ExistingEvent};
pub use identity::{derive_identity, DerivedIdentity};
pub use reconcile::Reconciler;
pub use selector::LabelSelector;
