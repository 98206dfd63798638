//! Concurrent event dispatch.
//!
//! One task per payload, no concurrency cap, no ordering between tasks. A
//! failed submission is logged where it happens and only counted; it never
//! cancels its siblings.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::clients::EventSink;
use crate::event::EventRecord;

/// Outcome of one dispatch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub submitted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Close,
}

impl Action {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Close => "close",
        }
    }
}

/// Fans payloads out to an [`EventSink`].
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn EventSink>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Submit one create payload per alert.
    pub async fn dispatch_create(&self, payloads: Vec<EventRecord>) -> DispatchReport {
        self.dispatch(payloads, Action::Create).await
    }

    /// Submit one resolve payload per stale event.
    pub async fn dispatch_close(&self, payloads: Vec<EventRecord>) -> DispatchReport {
        self.dispatch(payloads, Action::Close).await
    }

    async fn dispatch(&self, payloads: Vec<EventRecord>, action: Action) -> DispatchReport {
        let mut set = JoinSet::new();

        for payload in payloads {
            let sink = Arc::clone(&self.sink);
            set.spawn(async move {
                match sink.submit(&payload).await {
                    Ok(()) => {
                        info!(
                            action = action.as_str(),
                            event = %payload.name(),
                            entity = %payload.entity(),
                            "Event submitted"
                        );
                        true
                    }
                    Err(e) => {
                        error!(
                            action = action.as_str(),
                            sink = sink.name(),
                            event = %payload.name(),
                            entity = %payload.entity(),
                            error = %e,
                            "Failed to submit event"
                        );
                        false
                    }
                }
            });
        }

        let mut report = DispatchReport::default();
        while let Some(result) = set.join_next().await {
            match result {
                Ok(true) => report.submitted += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    error!(action = action.as_str(), error = %e, "Dispatch task panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
