//! Live metrics snapshots consumed by the evaluator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to read metrics snapshot from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("metrics provider unavailable: {0}")]
    Unavailable(String),
}

/// A nested metrics document, e.g. `{"system": {"memory": {"usage": 90}}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot(Value);

impl MetricsSnapshot {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Resolves a dotted path to a value.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.0, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Resolves a dotted path to a number.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }
}

impl From<Value> for MetricsSnapshot {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Source of metrics snapshots, polled once per evaluator tick.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError>;
}

/// Provider holding a snapshot the host pushes in.
#[derive(Default)]
pub struct StaticMetricsProvider {
    current: RwLock<MetricsSnapshot>,
}

impl StaticMetricsProvider {
    #[must_use]
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self { current: RwLock::new(snapshot) }
    }

    /// Replaces the snapshot returned by subsequent polls.
    pub fn set(&self, snapshot: MetricsSnapshot) {
        *self.current.write() = snapshot;
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        Ok(self.current.read().clone())
    }
}

/// Provider that re-reads a JSON file on every poll.
pub struct JsonFileMetricsProvider {
    path: PathBuf,
}

impl JsonFileMetricsProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricsProvider for JsonFileMetricsProvider {
    async fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| MetricsError::Io { path: self.path.clone(), source })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
