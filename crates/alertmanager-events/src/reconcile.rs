//! Auto-close reconciliation.
//!
//! Compares the fingerprints of the alerts currently in Alertmanager with the
//! fingerprints stamped on the events we created earlier. Any open event whose
//! alert disappeared from the feed is a close candidate.

use std::collections::HashSet;

use tracing::debug;

use crate::alert::{Alert, Labels};
use crate::event::ExistingEvent;

/// Fingerprints of the alerts seen in this run.
#[derive(Debug, Default)]
pub struct FingerprintSet<'a>(HashSet<&'a str>);

impl<'a> FingerprintSet<'a> {
    #[must_use]
    pub fn from_alerts(alerts: &'a [Alert]) -> Self {
        Self(alerts.iter().map(|alert| alert.fingerprint.as_str()).collect())
    }

    #[must_use]
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.0.contains(fingerprint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decides which previously emitted events must be resolved.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    /// Every pair must appear somewhere in the event, entity or check labels.
    /// Empty means no predicate.
    predicate: &'a Labels,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(predicate: &'a Labels) -> Self {
        Self { predicate }
    }

    /// Whether an event is ours, still open and satisfies the predicate.
    #[must_use]
    pub fn is_candidate(&self, event: &ExistingEvent) -> bool {
        event.is_owned()
            && !event.is_resolved()
            && self
                .predicate
                .iter()
                .all(|(key, value)| event.has_label(key, value))
    }

    /// Events to close: candidates whose fingerprint is not among `current`.
    /// Events without a fingerprint label are left alone.
    #[must_use]
    pub fn reconcile<'e>(
        &self,
        current: &[Alert],
        existing: &'e [ExistingEvent],
    ) -> Vec<&'e ExistingEvent> {
        let fingerprints = FingerprintSet::from_alerts(current);

        existing
            .iter()
            .filter(|event| self.is_candidate(event))
            .filter(|event| match event.fingerprint() {
                Some(fingerprint) => !fingerprints.contains(fingerprint),
                None => {
                    debug!(event = %event.name(), "Owned event has no fingerprint label, skipping");
                    false
                }
            })
            .collect()
    }
}
