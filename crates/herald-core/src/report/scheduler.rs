//! Scheduled report generation.
//!
//! Each tick selects the due definitions and runs their pipeline (collect, format, persist,
//! dispatch) in chunks of `max_concurrent_reports`. Items inside a chunk run concurrently, each
//! in its own task; chunks run one after another. Whatever happens to an item, its schedule is
//! advanced exactly once.
//!
//! Scheduled and on-demand runs share a per-definition claim: a definition never generates
//! twice at the same time, and a run that finds its definition already claimed is skipped
//! without touching the schedule.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use futures::{future::join_all, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    formatter::{format_report, FormatError, ReportHeader},
    manager::ReportManager,
    types::{storage_key, GeneratedReportArtifact, ScheduledReportDefinition},
};
use crate::{
    distribution::{Dispatcher, Notification},
    events::{EventBus, LifecycleEvent},
    runtime::ticker::{panic_message, SingleFlight},
    sources::DataCollector,
    store::StoreError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between scheduler ticks (default: 60).
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,

    /// Reports generated concurrently within one tick (default: 5).
    #[serde(default = "default_max_concurrent_reports")]
    pub max_concurrent_reports: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval_seconds() -> u64 {
    60
}

fn default_max_concurrent_reports() -> usize {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_interval_seconds: default_tick_interval_seconds(),
            max_concurrent_reports: default_max_concurrent_reports(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("report definition '{0}' not found")]
    DefinitionMissing(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("failed to persist artifact: {0}")]
    Store(#[from] StoreError),

    #[error("generation task panicked: {0}")]
    Panicked(String),

    #[error("report definition '{0}' is already generating")]
    AlreadyRunning(String),

    #[error("report definition '{0}' is no longer due")]
    NoLongerDue(String),
}

impl GenerationError {
    /// The run never started, so the schedule was left untouched.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::AlreadyRunning(_) | Self::NoLongerDue(_))
    }
}

/// Outcome counts of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerTickSummary {
    pub due: usize,
    pub generated: usize,
    pub failed: usize,
    /// Due definitions left alone because another run had them or already advanced them.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    OnDemand,
}

/// Marks a definition as generating; released on drop, including during a panic.
struct GenerationClaim {
    in_flight: Arc<DashSet<String>>,
    definition_id: String,
}

impl GenerationClaim {
    fn try_claim(in_flight: &Arc<DashSet<String>>, definition_id: &str) -> Option<Self> {
        in_flight.insert(definition_id.to_string()).then(|| Self {
            in_flight: Arc::clone(in_flight),
            definition_id: definition_id.to_string(),
        })
    }
}

impl Drop for GenerationClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.definition_id);
    }
}

pub struct ReportScheduler {
    config: ArcSwap<SchedulerConfig>,
    reports: Arc<ReportManager>,
    collector: Arc<DataCollector>,
    dispatcher: Arc<Dispatcher>,
    events: EventBus,
    guard: SingleFlight,
    in_flight: Arc<DashSet<String>>,
}

impl ReportScheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        reports: Arc<ReportManager>,
        collector: Arc<DataCollector>,
        dispatcher: Arc<Dispatcher>,
        events: EventBus,
    ) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            reports,
            collector,
            dispatcher,
            events,
            guard: SingleFlight::new("scheduler"),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Whether a run of `definition_id` is currently in flight.
    #[must_use]
    pub fn is_generating(&self, definition_id: &str) -> bool {
        self.in_flight.contains(definition_id)
    }

    #[must_use]
    pub fn config(&self) -> Arc<SchedulerConfig> {
        self.config.load_full()
    }

    pub fn update_config(&self, config: SchedulerConfig) {
        self.config.store(Arc::new(config));
    }

    /// One guarded scheduler pass. Returns `None` if the previous pass is still running.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> Option<SchedulerTickSummary> {
        let _permit = self.guard.try_acquire()?;

        if !self.config.load().enabled {
            debug!("scheduler disabled, skipping tick");
            return Some(SchedulerTickSummary::default());
        }

        Some(self.process_due(now).await)
    }

    /// Generates every due definition under the concurrency bound.
    pub async fn process_due(self: &Arc<Self>, now: DateTime<Utc>) -> SchedulerTickSummary {
        let due = self.reports.due_definitions(now);
        let mut summary = SchedulerTickSummary { due: due.len(), ..Default::default() };
        if due.is_empty() {
            return summary;
        }

        let chunk_size = self.config.load().max_concurrent_reports.max(1);
        debug!(due = due.len(), chunk_size, "processing due reports");

        for chunk in due.chunks(chunk_size) {
            let runs = chunk
                .iter()
                .map(|definition| self.run_and_record(&definition.id, now, Trigger::Scheduled));
            for result in join_all(runs).await {
                match result {
                    Ok(_) => summary.generated += 1,
                    Err(e) if e.is_skip() => summary.skipped += 1,
                    Err(_) => summary.failed += 1,
                }
            }
        }

        info!(
            due = summary.due,
            generated = summary.generated,
            failed = summary.failed,
            skipped = summary.skipped,
            "scheduler pass complete"
        );
        summary
    }

    /// Runs one definition immediately. Its schedule advances as for a scheduled run.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionMissing` for an unknown id and `AlreadyRunning` while a scheduled or
    /// on-demand run of the same definition is in flight; otherwise the generation failure.
    pub async fn generate_now(
        self: &Arc<Self>,
        definition_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GeneratedReportArtifact, GenerationError> {
        self.run_and_record(definition_id, now, Trigger::OnDemand).await
    }

    /// Claims the definition, then runs and records it in a task of its own.
    ///
    /// The attempt is recorded inside that task, so a caller dropping this future cannot
    /// separate a persisted artifact from its schedule update.
    async fn run_and_record(
        self: &Arc<Self>,
        definition_id: &str,
        now: DateTime<Utc>,
        trigger: Trigger,
    ) -> Result<GeneratedReportArtifact, GenerationError> {
        let Some(claim) = GenerationClaim::try_claim(&self.in_flight, definition_id) else {
            debug!(definition_id, ?trigger, "definition already generating, skipping");
            return Err(GenerationError::AlreadyRunning(definition_id.to_string()));
        };

        // Re-read under the claim: a run that finished meanwhile has advanced the schedule.
        let definition = match (self.reports.get_definition(definition_id), trigger) {
            (Some(definition), Trigger::OnDemand) => definition,
            (Some(definition), Trigger::Scheduled)
                if definition.is_active && definition.next_fire_time <= now =>
            {
                definition
            }
            (None, Trigger::OnDemand) => {
                return Err(GenerationError::DefinitionMissing(definition_id.to_string()));
            }
            (_, Trigger::Scheduled) => {
                debug!(definition_id, "definition no longer due, skipping");
                return Err(GenerationError::NoLongerDue(definition_id.to_string()));
            }
        };

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _claim = claim;
            let result = match AssertUnwindSafe(scheduler.generate(&definition, now))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(GenerationError::Panicked(panic_message(&*payload))),
            };
            scheduler.record(&definition, now, &result);
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(GenerationError::Panicked(e.to_string())),
        }
    }

    fn record(
        &self,
        definition: &ScheduledReportDefinition,
        now: DateTime<Utc>,
        result: &Result<GeneratedReportArtifact, GenerationError>,
    ) {
        match result {
            Ok(artifact) => {
                self.reports.record_attempt(&definition.id, now, None);
                self.events.emit(LifecycleEvent::ReportGenerated {
                    definition_id: definition.id.clone(),
                    artifact_id: artifact.id.clone(),
                    format: artifact.format,
                    data_point_count: artifact.data_point_count,
                    synthetic: artifact.synthetic,
                    at: now,
                });
            }
            Err(e) => {
                error!(definition_id = %definition.id, error = %e, "report generation failed");
                self.reports.record_attempt(&definition.id, now, Some(e.to_string()));
                self.events.emit(LifecycleEvent::ReportGenerationFailed {
                    definition_id: definition.id.clone(),
                    error: e.to_string(),
                    at: now,
                });
            }
        }
    }

    async fn generate(
        &self,
        definition: &ScheduledReportDefinition,
        now: DateTime<Utc>,
    ) -> Result<GeneratedReportArtifact, GenerationError> {
        let started = Instant::now();

        let bundle =
            self.collector.collect(&definition.data_source, &definition.filters, now).await;
        let header = ReportHeader { title: definition.name.clone(), generated_at: now };
        let payload = format_report(&bundle, &definition.filters, definition.format, &header)?;

        let artifact = GeneratedReportArtifact {
            id: Uuid::new_v4().to_string(),
            definition_id: definition.id.clone(),
            format: definition.format,
            generated_at: now,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            data_point_count: payload.data_point_count,
            size_bytes: payload.size_bytes(),
            storage_key: storage_key(&definition.id, now),
            synthetic: bundle.synthetic,
        };

        self.reports.store().put(&artifact.storage_key, &payload.bytes, &artifact).await?;
        self.reports.index_artifact(artifact.clone());
        debug!(
            definition_id = %definition.id,
            artifact_id = %artifact.id,
            size_bytes = artifact.size_bytes,
            "artifact stored"
        );

        if !definition.distribution_methods.is_empty() {
            let notification =
                Notification::report(definition, &artifact, Arc::from(payload.bytes));
            let outcomes = self
                .dispatcher
                .dispatch(&notification, &definition.recipients, &definition.distribution_methods)
                .await;
            let failed = outcomes.iter().filter(|o| !o.success).count();
            if failed > 0 {
                warn!(
                    definition_id = %definition.id,
                    failed,
                    total = outcomes.len(),
                    "report distribution partially failed"
                );
            }
        }

        Ok(artifact)
    }
}
