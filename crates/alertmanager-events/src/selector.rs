//! Include/exclude label selectors applied to the raw alert list.

use crate::alert::{Alert, Labels};

/// Exact-match label selector.
///
/// An alert is kept when it carries every `include` pair and none of the
/// `exclude` pairs. A missing key never satisfies an include pair and never
/// triggers an exclude pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    pub include: Labels,
    pub exclude: Labels,
}

impl LabelSelector {
    #[must_use]
    pub fn new(include: Labels, exclude: Labels) -> Self {
        Self { include, exclude }
    }

    /// Check a label set against the selector.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        let included = self
            .include
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value));

        included
            && !self
                .exclude
                .iter()
                .any(|(key, value)| labels.get(key) == Some(value))
    }

    /// Keep only the alerts matching the selector, preserving order.
    #[must_use]
    pub fn filter(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        alerts
            .into_iter()
            .filter(|alert| self.matches(&alert.labels))
            .collect()
    }
}
