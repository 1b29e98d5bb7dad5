//! Builder pattern for initializing the Herald runtime with pluggable adapters and channels.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::HeraldRuntime, HeraldComponents};
use crate::{
    alerts::{
        AlertEvaluator, AlertManager, JsonFileMetricsProvider, MetricsProvider,
        StaticMetricsProvider,
    },
    config::AppConfig,
    distribution::{ChannelRegistry, Dispatcher, NotificationChannel},
    events::EventBus,
    report::{ReportManager, ReportScheduler},
    retention::RetentionSweeper,
    sources::{DataCollector, DataSource, DataSourceRegistry},
    store::{ArtifactStore, MemoryArtifactStore, SqliteArtifactStore, StoreError},
    types::CommandError,
};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The artifact store could not be opened or its index could not be loaded
    #[error("Artifact storage initialization failed: {0}")]
    Storage(#[from] StoreError),

    /// A report definition or alert rule from the config was rejected
    #[error("Invalid seed {kind} '{name}': {source}")]
    Seed {
        kind: &'static str,
        name: String,
        #[source]
        source: CommandError,
    },
}

/// Builder for constructing a [`HeraldRuntime`].
///
/// Adapters, channels, the metrics provider and the artifact store are injected here. Anything
/// not injected falls back to what the configuration selects.
///
/// # Examples
///
/// ```no_run
/// # use herald_core::{config::AppConfig, runtime::HeraldRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
///
/// let runtime = HeraldRuntimeBuilder::new().with_config(config).build().await?;
/// runtime.start();
/// # Ok(())
/// # }
/// ```
pub struct HeraldRuntimeBuilder {
    config: Option<AppConfig>,
    sources: Vec<(String, Arc<dyn DataSource>)>,
    channels: Vec<(String, Arc<dyn NotificationChannel>)>,
    metrics: Option<Arc<dyn MetricsProvider>>,
    store: Option<Arc<dyn ArtifactStore>>,
    shutdown_channel_capacity: usize,
}

impl HeraldRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            sources: Vec::new(),
            channels: Vec::new(),
            metrics: None,
            store: None,
            shutdown_channel_capacity: 16,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers a data source adapter under `name`.
    #[must_use]
    pub fn with_data_source(mut self, name: &str, source: Arc<dyn DataSource>) -> Self {
        self.sources.push((name.to_string(), source));
        self
    }

    /// Registers a notification channel under `name`. The built-in `log` channel can be
    /// replaced this way.
    #[must_use]
    pub fn with_channel(mut self, name: &str, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push((name.to_string(), channel));
        self
    }

    /// Overrides the metrics provider selected by `alerting.metrics_snapshot_path`.
    #[must_use]
    pub fn with_metrics_provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(provider);
        self
    }

    /// Overrides the store selected by `storage.backend`.
    #[must_use]
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the runtime: opens the artifact store, rehydrates the artifact index, wires the
    /// components and creates the seed definitions and rules. Tick loops are not started.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` if configuration is missing or invalid, the store cannot be
    /// initialized, or a seed definition or rule fails validation.
    pub async fn build(self) -> Result<HeraldRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        info!(
            storage_backend = %config.storage.backend,
            data_sources = self.sources.len(),
            channels = self.channels.len(),
            seed_reports = config.reports.len(),
            seed_rules = config.alert_rules.len(),
            "Initializing Herald runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.shutdown_channel_capacity.max(1));
        let events = EventBus::new(config.events.channel_capacity);

        let store: Arc<dyn ArtifactStore> = match self.store {
            Some(store) => store,
            None if config.storage.backend == "sqlite" => {
                Arc::new(SqliteArtifactStore::connect(&config.storage.database_url).await?)
            }
            None => Arc::new(MemoryArtifactStore::new()),
        };

        let report_manager = Arc::new(ReportManager::new(store));
        let rehydrated = report_manager.rehydrate().await?;
        debug!(artifacts = rehydrated, "Report manager initialized");

        let sources = Arc::new(DataSourceRegistry::new());
        for (name, source) in self.sources {
            sources.register(&name, source);
        }

        let channels = Arc::new(ChannelRegistry::with_builtin());
        for (name, channel) in self.channels {
            channels.register(&name, channel);
        }

        let dispatcher = Arc::new(Dispatcher::new(channels, config.distribution.clone()));
        debug!("Dispatcher initialized");

        let snapshot_path = config.alerting.metrics_snapshot_path.as_ref();
        let metrics: Arc<dyn MetricsProvider> = match (self.metrics, snapshot_path) {
            (Some(provider), _) => provider,
            (None, Some(path)) => Arc::new(JsonFileMetricsProvider::new(path)),
            (None, None) => Arc::new(StaticMetricsProvider::default()),
        };

        let alert_manager = Arc::new(AlertManager::new(events.clone()));

        let scheduler = Arc::new(ReportScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&report_manager),
            Arc::new(DataCollector::new(Arc::clone(&sources))),
            Arc::clone(&dispatcher),
            events.clone(),
        ));
        let evaluator = Arc::new(AlertEvaluator::new(
            config.alerting.clone(),
            Arc::clone(&alert_manager),
            Arc::clone(&metrics),
            Arc::clone(&dispatcher),
            events.clone(),
        ));
        let sweeper = Arc::new(RetentionSweeper::new(
            config.retention.clone(),
            Arc::clone(&report_manager),
            Arc::clone(&alert_manager),
        ));
        debug!("Scheduler, evaluator and sweeper initialized");

        let now = Utc::now();
        for request in &config.reports {
            let name = request.name.clone().unwrap_or_default();
            report_manager.create_definition(request.clone(), now).map_err(|source| {
                RuntimeError::Seed { kind: "report definition", name, source }
            })?;
        }
        for request in &config.alert_rules {
            let name = request.name.clone().unwrap_or_default();
            alert_manager
                .create_rule(request.clone(), now)
                .map_err(|source| RuntimeError::Seed { kind: "alert rule", name, source })?;
        }

        let components = HeraldComponents::new(
            report_manager,
            scheduler,
            alert_manager,
            evaluator,
            sweeper,
            dispatcher,
            sources,
            metrics,
            events,
        );

        info!("Herald runtime initialization complete");

        Ok(HeraldRuntime::new(components, shutdown_tx, config))
    }
}

impl Default for HeraldRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
