//! Data source adapters and the collection pipeline.
//!
//! Concrete adapters (analytics, business, security, ...) live in the host and are registered
//! by name. [`DataCollector`] resolves a name to an adapter and, when the adapter is missing or
//! fails, substitutes the [`FallbackSource`] so the report still renders. Fallback bundles are
//! always tagged `synthetic = true`.

pub mod fallback;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::report::types::ReportFilters;

pub use fallback::FallbackSource;

/// Errors an adapter may return. All of them are recovered by the collector.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("data source query failed: {0}")]
    Query(String),
}

/// One entry of a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl DataPoint {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, fields: BTreeMap::new() }
    }

    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Returns the named field if it holds a number.
    #[must_use]
    pub fn numeric(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }
}

/// Data returned by an adapter for one report run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<DataPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<BTreeMap<String, Value>>,
    /// Produced by the fallback adapter rather than a real source.
    #[serde(default)]
    pub synthetic: bool,
}

impl DataBundle {
    /// Number of data entries: time-series length, or summary field count when there is no
    /// time series.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match (&self.time_series, &self.summary) {
            (Some(series), _) => series.len(),
            (None, Some(summary)) => summary.len(),
            (None, None) => 0,
        }
    }
}

/// A named provider of report data. Implementations must not have side effects.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn collect(&self, filters: &ReportFilters) -> Result<DataBundle, SourceError>;
}

/// Registered data source adapters, keyed by name.
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: DashMap<String, Arc<dyn DataSource>>,
}

impl DataSourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous adapter with the same name.
    pub fn register(&self, name: &str, source: Arc<dyn DataSource>) {
        if self.sources.insert(name.to_string(), source).is_some() {
            debug!(source = %name, "replaced data source adapter");
        } else {
            debug!(source = %name, "registered data source adapter");
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sources.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

/// Resolves data for a report, degrading to synthetic data instead of failing.
pub struct DataCollector {
    registry: Arc<DataSourceRegistry>,
    fallback: FallbackSource,
}

impl DataCollector {
    #[must_use]
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        Self { registry, fallback: FallbackSource::new() }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<DataSourceRegistry> {
        &self.registry
    }

    /// Collects data from the named source.
    ///
    /// Never fails: an unknown adapter or an adapter error yields a synthetic bundle of the
    /// same shape. Real bundles always come back with `synthetic = false`.
    pub async fn collect(
        &self,
        source_name: &str,
        filters: &ReportFilters,
        now: DateTime<Utc>,
    ) -> DataBundle {
        let Some(source) = self.registry.get(source_name) else {
            warn!(source = %source_name, "data source not registered, using synthetic fallback");
            return self.fallback.generate(source_name, filters, now);
        };

        match source.collect(filters).await {
            Ok(mut bundle) => {
                bundle.synthetic = false;
                bundle
            }
            Err(e) => {
                warn!(
                    source = %source_name,
                    error = %e,
                    "data source failed, report degraded to synthetic fallback"
                );
                self.fallback.generate(source_name, filters, now)
            }
        }
    }
}
