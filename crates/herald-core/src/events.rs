//! Lifecycle notifications published to host subscribers.
//!
//! The core never calls back into the host directly. Every observable state change is pushed
//! onto a bounded [`tokio::sync::broadcast`] channel; subscribers that fall behind observe a
//! `Lagged` error instead of slowing down tick processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::{
    alerts::types::{AlertResolution, AlertSeverity},
    report::types::OutputFormat,
};

/// Events emitted by the engine over its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Tick loops were started.
    ServiceStarted { at: DateTime<Utc> },
    /// Tick loops were stopped.
    ServiceStopped { at: DateTime<Utc> },
    /// A scheduled report produced an artifact.
    ReportGenerated {
        definition_id: String,
        artifact_id: String,
        format: OutputFormat,
        data_point_count: usize,
        synthetic: bool,
        at: DateTime<Utc>,
    },
    /// A scheduled report failed to generate. The schedule was still advanced.
    ReportGenerationFailed { definition_id: String, error: String, at: DateTime<Utc> },
    /// A rule condition became true and a new alert instance was created.
    AlertTriggered {
        alert_id: String,
        rule_id: String,
        severity: AlertSeverity,
        message: String,
        at: DateTime<Utc>,
    },
    /// An unresolved alert exceeded its escalation timeout.
    AlertEscalated { alert_id: String, rule_id: String, escalation_level: u32, at: DateTime<Utc> },
    /// An alert reached the terminal resolved state.
    AlertResolved {
        alert_id: String,
        rule_id: String,
        resolution: AlertResolution,
        at: DateTime<Utc>,
    },
    /// Engine configuration was replaced at runtime.
    ConfigurationUpdated { at: DateTime<Utc> },
}

impl LifecycleEvent {
    /// Short stable name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ReportGenerated { .. } => "report_generated",
            Self::ReportGenerationFailed { .. } => "report_generation_failed",
            Self::AlertTriggered { .. } => "alert_triggered",
            Self::AlertEscalated { .. } => "alert_escalated",
            Self::AlertResolved { .. } => "alert_resolved",
            Self::ConfigurationUpdated { .. } => "configuration_updated",
        }
    }
}

/// Cloneable publisher handle for [`LifecycleEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Creates a bus whose subscribers can buffer up to `capacity` events each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns a new receiver that observes every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: LifecycleEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            trace!(event = kind, "no lifecycle subscribers");
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
