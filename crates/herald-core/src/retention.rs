//! Pruning of expired artifacts and old resolved alerts.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{alerts::AlertManager, report::ReportManager, runtime::ticker::SingleFlight};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps (default: 3600).
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Artifacts older than this are deleted (default: 30).
    #[serde(default = "default_artifact_retention_days")]
    pub artifact_retention_days: u32,

    /// Resolved alerts are kept this long after resolution (default: 7).
    #[serde(default = "default_resolved_alert_grace_days")]
    pub resolved_alert_grace_days: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval_seconds() -> u64 {
    3600
}

fn default_artifact_retention_days() -> u32 {
    30
}

fn default_resolved_alert_grace_days() -> u32 {
    7
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            artifact_retention_days: default_artifact_retention_days(),
            resolved_alert_grace_days: default_resolved_alert_grace_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub artifacts_removed: usize,
    /// Artifacts whose payload could not be deleted. They stay indexed for the next sweep.
    pub artifact_failures: usize,
    pub alerts_removed: usize,
}

pub struct RetentionSweeper {
    config: ArcSwap<RetentionConfig>,
    reports: Arc<ReportManager>,
    alerts: Arc<AlertManager>,
    guard: SingleFlight,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(
        config: RetentionConfig,
        reports: Arc<ReportManager>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            reports,
            alerts,
            guard: SingleFlight::new("retention"),
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<RetentionConfig> {
        self.config.load_full()
    }

    pub fn update_config(&self, config: RetentionConfig) {
        self.config.store(Arc::new(config));
    }

    /// One guarded sweep. Returns `None` if the previous sweep is still running.
    pub async fn tick(&self, now: DateTime<Utc>) -> Option<SweepSummary> {
        let _permit = self.guard.try_acquire()?;

        if !self.config.load().enabled {
            debug!("retention disabled, skipping sweep");
            return Some(SweepSummary::default());
        }

        Some(self.sweep(now).await)
    }

    /// Deletes artifacts older than the retention period and resolved alerts past the grace
    /// period. Each item is handled independently.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        let config = self.config.load_full();
        let retention = Duration::days(i64::from(config.artifact_retention_days));
        let grace = Duration::days(i64::from(config.resolved_alert_grace_days));
        let mut summary = SweepSummary::default();

        for artifact in self.reports.all_artifacts() {
            if now - artifact.generated_at <= retention {
                continue;
            }
            match self.reports.store().delete(&artifact.storage_key).await {
                Ok(()) => {
                    self.reports.unindex_artifact(&artifact.id);
                    summary.artifacts_removed += 1;
                }
                Err(e) => {
                    warn!(
                        artifact_id = %artifact.id,
                        storage_key = %artifact.storage_key,
                        error = %e,
                        "failed to delete expired artifact, will retry next sweep"
                    );
                    summary.artifact_failures += 1;
                }
            }
        }

        for alert in self.alerts.all_alerts() {
            let expired = alert.resolved_at.is_some_and(|resolved_at| now - resolved_at > grace);
            if alert.is_resolved() && expired && self.alerts.remove_alert(&alert.id).is_some() {
                summary.alerts_removed += 1;
            }
        }

        if summary.artifacts_removed + summary.artifact_failures + summary.alerts_removed > 0 {
            info!(
                artifacts_removed = summary.artifacts_removed,
                artifact_failures = summary.artifact_failures,
                alerts_removed = summary.alerts_removed,
                "retention sweep complete"
            );
        }
        summary
    }
}
