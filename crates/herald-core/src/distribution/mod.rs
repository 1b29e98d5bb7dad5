//! Notification channels and fan-out.
//!
//! Concrete channels (mail, webhook, SMS, ...) live in the host and are registered by name in the
//! [`ChannelRegistry`]. A definition's `distribution_methods` and a rule's `actions` are channel
//! names. The [`Dispatcher`] sends one [`Notification`] to every named channel concurrently and
//! records a per-channel outcome; it never fails the caller.

pub mod dispatcher;
pub mod log_channel;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    alerts::types::{AlertInstance, AlertSeverity},
    report::types::{GeneratedReportArtifact, ScheduledReportDefinition},
};

pub use dispatcher::{DispatchOutcome, Dispatcher, DistributionConfig};
pub use log_channel::LogChannel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel not registered")]
    NotRegistered,

    #[error("channel timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("channel rejected notification: {0}")]
    Rejected(String),

    #[error("channel unavailable: {0}")]
    Unavailable(String),

    #[error("channel panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Report,
    AlertTriggered,
    AlertEscalated,
}

/// File attached to a report notification.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: &'static str,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
}

/// Rendered payload handed to every channel.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    pub severity: Option<AlertSeverity>,
    pub attachment: Option<Attachment>,
}

impl Notification {
    /// Notification for a freshly generated report, with the payload attached.
    #[must_use]
    pub fn report(
        definition: &ScheduledReportDefinition,
        artifact: &GeneratedReportArtifact,
        payload: Arc<[u8]>,
    ) -> Self {
        let mut body = format!(
            "Report '{}' generated at {} with {} data points.",
            definition.name,
            artifact.generated_at.to_rfc3339(),
            artifact.data_point_count
        );
        if artifact.synthetic {
            body.push_str(" The data source was unavailable; figures are synthetic.");
        }

        Self {
            kind: NotificationKind::Report,
            subject: format!("Report: {}", definition.name),
            body,
            severity: None,
            attachment: Some(Attachment {
                file_name: format!("{}.{}", artifact.storage_key, artifact.format.as_str()),
                content_type: artifact.format.content_type(),
                bytes: payload,
            }),
        }
    }

    #[must_use]
    pub fn alert_triggered(alert: &AlertInstance) -> Self {
        Self {
            kind: NotificationKind::AlertTriggered,
            subject: format!("[{}] {}", alert.severity, alert.rule_name),
            body: alert.message.clone(),
            severity: Some(alert.severity),
            attachment: None,
        }
    }

    #[must_use]
    pub fn alert_escalated(alert: &AlertInstance) -> Self {
        Self {
            kind: NotificationKind::AlertEscalated,
            subject: format!(
                "[{}] {} (escalation level {})",
                alert.severity, alert.rule_name, alert.escalation_level
            ),
            body: format!(
                "{} Unresolved since {}.",
                alert.message,
                alert.triggered_at.to_rfc3339()
            ),
            severity: Some(alert.severity),
            attachment: None,
        }
    }
}

/// A named sender. Implementations own their retry policy.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<(), ChannelError>;
}

/// Registered channels, keyed by method name.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<dyn NotificationChannel>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `log` channel.
    #[must_use]
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(log_channel::LOG_CHANNEL, Arc::new(LogChannel));
        registry
    }

    pub fn register(&self, name: &str, channel: Arc<dyn NotificationChannel>) {
        if self.channels.insert(name.to_string(), channel).is_some() {
            debug!(channel = %name, "replaced notification channel");
        } else {
            debug!(channel = %name, "registered notification channel");
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.get(name).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}
