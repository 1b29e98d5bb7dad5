//! Core component container for the Herald runtime.

use std::sync::Arc;

use crate::{
    alerts::{AlertEvaluator, AlertManager, MetricsProvider},
    distribution::{ChannelRegistry, Dispatcher},
    events::EventBus,
    report::{ReportManager, ReportScheduler},
    retention::RetentionSweeper,
    sources::DataSourceRegistry,
};

/// Container for all initialized Herald components.
///
/// All components are wrapped in `Arc` so tick loops and host code share the same instances.
/// Registries and managers use interior mutability; cloning the container is cheap.
#[derive(Clone)]
pub struct HeraldComponents {
    report_manager: Arc<ReportManager>,
    scheduler: Arc<ReportScheduler>,
    alert_manager: Arc<AlertManager>,
    evaluator: Arc<AlertEvaluator>,
    sweeper: Arc<RetentionSweeper>,
    dispatcher: Arc<Dispatcher>,
    sources: Arc<DataSourceRegistry>,
    metrics: Arc<dyn MetricsProvider>,
    events: EventBus,
}

impl HeraldComponents {
    /// Called by `HeraldRuntimeBuilder` during initialization.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        report_manager: Arc<ReportManager>,
        scheduler: Arc<ReportScheduler>,
        alert_manager: Arc<AlertManager>,
        evaluator: Arc<AlertEvaluator>,
        sweeper: Arc<RetentionSweeper>,
        dispatcher: Arc<Dispatcher>,
        sources: Arc<DataSourceRegistry>,
        metrics: Arc<dyn MetricsProvider>,
        events: EventBus,
    ) -> Self {
        Self {
            report_manager,
            scheduler,
            alert_manager,
            evaluator,
            sweeper,
            dispatcher,
            sources,
            metrics,
            events,
        }
    }

    #[must_use]
    pub fn report_manager(&self) -> &Arc<ReportManager> {
        &self.report_manager
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<ReportScheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.alert_manager
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<AlertEvaluator> {
        &self.evaluator
    }

    #[must_use]
    pub fn sweeper(&self) -> &Arc<RetentionSweeper> {
        &self.sweeper
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Registered data source adapters.
    #[must_use]
    pub fn sources(&self) -> &Arc<DataSourceRegistry> {
        &self.sources
    }

    /// Registered notification channels. Shared with the dispatcher.
    #[must_use]
    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        self.dispatcher.channels()
    }

    #[must_use]
    pub fn metrics_provider(&self) -> &Arc<dyn MetricsProvider> {
        &self.metrics
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
