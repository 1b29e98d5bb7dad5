use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use futures::{future::join_all, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChannelError, ChannelRegistry, Notification};
use crate::runtime::ticker::panic_message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Upper bound on a single channel send (default: 10000).
    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,

    /// Re-notify escalations of acknowledged alerts (default: false).
    #[serde(default)]
    pub notify_acknowledged: bool,
}

fn default_channel_timeout_ms() -> u64 {
    10_000
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self { channel_timeout_ms: default_channel_timeout_ms(), notify_acknowledged: false }
    }
}

/// Result of sending to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub method: String,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl DispatchOutcome {
    fn new(method: &str, result: Result<(), ChannelError>, elapsed: Duration) -> Self {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(()) => Self { method: method.to_string(), success: true, error: None, elapsed_ms },
            Err(e) => Self {
                method: method.to_string(),
                success: false,
                error: Some(e.to_string()),
                elapsed_ms,
            },
        }
    }
}

/// Fans a notification out to channels.
///
/// Each channel is sent to concurrently and bounded by `channel_timeout_ms`. Failures are
/// recorded per channel and never retried here. A panicking channel is recorded as a failed
/// outcome and does not unwind into the caller.
pub struct Dispatcher {
    channels: Arc<ChannelRegistry>,
    config: ArcSwap<DistributionConfig>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(channels: Arc<ChannelRegistry>, config: DistributionConfig) -> Self {
        Self { channels, config: ArcSwap::from_pointee(config) }
    }

    #[must_use]
    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    #[must_use]
    pub fn config(&self) -> Arc<DistributionConfig> {
        self.config.load_full()
    }

    pub fn update_config(&self, config: DistributionConfig) {
        self.config.store(Arc::new(config));
    }

    /// Sends `notification` to `recipients` through every method in `methods`.
    ///
    /// Outcomes are returned in method order. Duplicate method names are sent once.
    pub async fn dispatch(
        &self,
        notification: &Notification,
        recipients: &[String],
        methods: &[String],
    ) -> Vec<DispatchOutcome> {
        let mut unique: Vec<&str> = Vec::with_capacity(methods.len());
        for method in methods {
            if !unique.contains(&method.as_str()) {
                unique.push(method.as_str());
            }
        }

        let timeout_ms = self.config.load().channel_timeout_ms;
        let timeout = Duration::from_millis(timeout_ms);

        let sends = unique.into_iter().map(|method| async move {
            let started = Instant::now();
            let result = match self.channels.get(method) {
                None => Err(ChannelError::NotRegistered),
                Some(channel) => {
                    let send = AssertUnwindSafe(channel.send(recipients, notification))
                        .catch_unwind();
                    match tokio::time::timeout(timeout, send).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(payload)) => Err(ChannelError::Panicked(panic_message(&*payload))),
                        Err(_) => Err(ChannelError::Timeout { timeout_ms }),
                    }
                }
            };

            match &result {
                Ok(()) => debug!(method = %method, subject = %notification.subject, "delivered"),
                Err(e) => warn!(
                    method = %method,
                    subject = %notification.subject,
                    error = %e,
                    "notification delivery failed"
                ),
            }
            DispatchOutcome::new(method, result, started.elapsed())
        });

        join_all(sends).await
    }
}
