//! Runtime lifecycle management including tick loops and graceful shutdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{
    builder::{HeraldRuntimeBuilder, RuntimeError},
    ticker::spawn_periodic,
    HeraldComponents,
};
use crate::{
    alerts::AlertManager,
    config::AppConfig,
    distribution::NotificationChannel,
    events::{EventBus, LifecycleEvent},
    report::{GeneratedReportArtifact, GenerationError, ReportManager},
    sources::DataSource,
};

/// Point-in-time view of the engine for hosts and dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub definition_count: usize,
    pub artifact_count: usize,
    pub rule_count: usize,
    /// Unresolved alert instances.
    pub active_alert_count: usize,
    pub data_sources: Vec<String>,
    pub channels: Vec<String>,
    pub config: AppConfig,
}

/// Main runtime container managing component lifecycles and tick loops.
///
/// Building a runtime wires the components; [`start`](Self::start) spawns the scheduler,
/// evaluator and retention loops. [`shutdown`](Self::shutdown) broadcasts the stop signal and
/// waits for every loop to exit. A tick already in flight finishes before `ServiceStopped` is
/// emitted.
pub struct HeraldRuntime {
    components: HeraldComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: ArcSwap<AppConfig>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown_initiated: AtomicBool,
}

impl HeraldRuntime {
    /// Creates a new builder for constructing a `HeraldRuntime`.
    #[must_use]
    pub fn builder() -> HeraldRuntimeBuilder {
        HeraldRuntimeBuilder::new()
    }

    /// Called by `HeraldRuntimeBuilder` during initialization.
    pub(super) fn new(
        components: HeraldComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
    ) -> Self {
        Self {
            components,
            shutdown_tx,
            config: ArcSwap::from_pointee(config),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    /// Spawns the tick loops and emits `ServiceStarted`.
    ///
    /// All three loops are always spawned; a disabled component skips its work on each tick so
    /// it can be enabled later through [`update_config`](Self::update_config). Intervals are
    /// read once here. Calling `start` twice, or after shutdown, does nothing.
    pub fn start(&self) {
        if self.shutdown_initiated.load(Ordering::SeqCst) {
            warn!("Runtime already shut down, ignoring start");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Runtime already started, ignoring duplicate call");
            return;
        }

        let config = self.config.load_full();
        let mut tasks = self.tasks.lock();

        let scheduler = Arc::clone(self.components.scheduler());
        tasks.push(spawn_periodic(
            "scheduler",
            config.scheduler_tick_interval(),
            self.shutdown_tx.subscribe(),
            move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    if scheduler.tick(Utc::now()).await.is_none() {
                        debug!("previous scheduler tick still running, skipped");
                    }
                }
            },
        ));

        let evaluator = Arc::clone(self.components.evaluator());
        tasks.push(spawn_periodic(
            "alert-evaluator",
            config.evaluation_interval(),
            self.shutdown_tx.subscribe(),
            move || {
                let evaluator = Arc::clone(&evaluator);
                async move {
                    if evaluator.tick(Utc::now()).await.is_none() {
                        debug!("previous evaluator tick still running, skipped");
                    }
                }
            },
        ));

        let sweeper = Arc::clone(self.components.sweeper());
        tasks.push(spawn_periodic(
            "retention",
            config.sweep_interval(),
            self.shutdown_tx.subscribe(),
            move || {
                let sweeper = Arc::clone(&sweeper);
                async move {
                    if sweeper.tick(Utc::now()).await.is_none() {
                        debug!("previous retention sweep still running, skipped");
                    }
                }
            },
        ));
        drop(tasks);

        info!(
            scheduler_enabled = config.scheduler.enabled,
            alerting_enabled = config.alerting.enabled,
            retention_enabled = config.retention.enabled,
            "Herald runtime started"
        );
        self.components.events().emit(LifecycleEvent::ServiceStarted { at: Utc::now() });
    }

    /// Stops every tick loop, waits for in-flight ticks and emits `ServiceStopped`.
    ///
    /// Idempotent: only the first call does anything.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating Herald runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!(error = %e, "No tick loops listening for shutdown");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Tick loop cancelled"),
                Err(e) => error!(error = %e, "Tick loop terminated abnormally"),
            }
        }

        self.components.events().emit(LifecycleEvent::ServiceStopped { at: Utc::now() });
        info!("Herald runtime shutdown complete");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Replaces the engine configuration and pushes each section to its component.
    ///
    /// Takes effect on the next tick. Tick intervals, the storage backend and the event
    /// buffer size are fixed at start. Seed lists are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidation` and keeps the current configuration if `config` is invalid.
    pub fn update_config(&self, config: AppConfig) -> Result<(), RuntimeError> {
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        self.components.scheduler().update_config(config.scheduler.clone());
        self.components.evaluator().update_config(config.alerting.clone());
        self.components.sweeper().update_config(config.retention.clone());
        self.components.dispatcher().update_config(config.distribution.clone());
        self.config.store(Arc::new(config));

        info!("Herald configuration updated");
        self.components.events().emit(LifecycleEvent::ConfigurationUpdated { at: Utc::now() });
        Ok(())
    }

    /// Registers a data source adapter. Used from the next generation onwards.
    pub fn register_data_source(&self, name: &str, source: Arc<dyn DataSource>) {
        self.components.sources().register(name, source);
    }

    /// Registers a notification channel. Used from the next dispatch onwards.
    pub fn register_channel(&self, name: &str, channel: Arc<dyn NotificationChannel>) {
        self.components.channels().register(name, channel);
    }

    /// Runs a definition's pipeline immediately. Its schedule is advanced as for a tick.
    ///
    /// # Errors
    ///
    /// Returns the generation failure; the failure is also recorded on the definition.
    pub async fn generate_now(
        &self,
        definition_id: &str,
    ) -> Result<GeneratedReportArtifact, GenerationError> {
        self.components.scheduler().generate_now(definition_id, Utc::now()).await
    }

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let reports = self.components.report_manager();
        let alerts = self.components.alert_manager();
        StatusSnapshot {
            running: self.is_running(),
            definition_count: reports.definition_count(),
            artifact_count: reports.artifact_count(),
            rule_count: alerts.rule_count(),
            active_alert_count: alerts.active_alert_count(),
            data_sources: self.components.sources().names(),
            channels: self.components.channels().names(),
            config: AppConfig::clone(&self.config.load()),
        }
    }

    /// Subscribes to lifecycle events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.components.events().subscribe()
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn components(&self) -> &HeraldComponents {
        &self.components
    }

    /// Returns the effective configuration.
    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    /// Convenience accessor for report definitions and artifacts.
    #[must_use]
    pub fn reports(&self) -> &Arc<ReportManager> {
        self.components.report_manager()
    }

    /// Convenience accessor for alert rules and instances.
    #[must_use]
    pub fn alerts(&self) -> &Arc<AlertManager> {
        self.components.alert_manager()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        self.components.events()
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<HeraldRuntime>;
    let _ = assert_sync::<HeraldRuntime>;
};
