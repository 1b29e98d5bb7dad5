//! Synthetic data used when a real data source cannot serve a report.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde_json::Value;

use super::{DataBundle, DataPoint};
use crate::report::types::ReportFilters;

const SYNTHETIC_POINTS: i64 = 24;

/// Produces a deterministic hourly series so degraded reports keep their usual shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSource;

impl FallbackSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds 24 hourly points ending at the filter's end bound (or `now`), plus a summary.
    #[must_use]
    pub fn generate(
        &self,
        source_name: &str,
        filters: &ReportFilters,
        now: DateTime<Utc>,
    ) -> DataBundle {
        let end = filters.end.unwrap_or(now);
        let end = end.duration_trunc(Duration::hours(1)).unwrap_or(end);

        let series: Vec<DataPoint> = (0..SYNTHETIC_POINTS)
            .map(|i| {
                let timestamp = end - Duration::hours(SYNTHETIC_POINTS - 1 - i);
                DataPoint::new(timestamp).with("value", synthetic_value(i))
            })
            .collect();

        let total: f64 = series.iter().filter_map(|p| p.numeric("value")).sum();

        #[allow(clippy::cast_precision_loss)]
        let average = total / SYNTHETIC_POINTS as f64;

        let mut summary = BTreeMap::new();
        summary.insert("source".to_string(), Value::from(source_name));
        summary.insert("points".to_string(), Value::from(SYNTHETIC_POINTS));
        summary.insert("total".to_string(), Value::from(total));
        summary.insert("average".to_string(), Value::from(average));

        DataBundle { time_series: Some(series), summary: Some(summary), synthetic: true }
    }
}

#[allow(clippy::cast_precision_loss)]
fn synthetic_value(index: i64) -> f64 {
    100.0 + ((index * 37) % 50) as f64
}
