//! Test Helper Functions and Utilities
//!
//! Common helpers for creating definitions, rules, bundles and snapshots.

use chrono::{DateTime, Duration, TimeZone, Utc};
use herald_core::{
    alerts::{AlertCondition, AlertRuleRequest, MetricsSnapshot, ThresholdSpec},
    report::{Frequency, OutputFormat, ReportDefinitionRequest, ScheduleSpec},
    sources::{DataBundle, DataPoint},
};
use serde_json::Value;

/// Fixed reference instant so schedules are reproducible.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).single().unwrap_or_else(Utc::now)
}

/// `count` hourly points ending at `end`, with `value` rising 10, 20, 30...
#[must_use]
pub fn hourly_bundle(end: DateTime<Utc>, count: usize) -> DataBundle {
    let series = (0..count)
        .map(|i| {
            let offset = i64::try_from(count - 1 - i).unwrap_or(0);
            let value = u32::try_from(i + 1).unwrap_or(u32::MAX) * 10;
            DataPoint::new(end - Duration::hours(offset)).with("value", value)
        })
        .collect();
    DataBundle { time_series: Some(series), summary: None, synthetic: false }
}

/// Hourly JSON definition reading from `source`.
#[must_use]
pub fn hourly_report(name: &str, source: &str) -> ReportDefinitionRequest {
    let mut request =
        ReportDefinitionRequest::new(name, source, ScheduleSpec::new(Frequency::Hourly));
    request.format = OutputFormat::Json;
    request
}

/// `memory_high` rule with the given threshold, notifying through `actions`.
#[must_use]
pub fn memory_rule(threshold: f64, actions: &[&str]) -> AlertRuleRequest {
    let mut request = AlertRuleRequest::new(
        "High memory",
        AlertCondition::new("memory_high"),
        ThresholdSpec::new(threshold).with_unit("%"),
    );
    request.actions = actions.iter().map(|a| (*a).to_string()).collect();
    request.recipients = vec!["ops@example.com".to_string()];
    request
}

#[must_use]
pub fn memory_snapshot(usage: f64) -> MetricsSnapshot {
    MetricsSnapshot::new(serde_json::json!({ "system": { "memory": { "usage": usage } } }))
}

#[must_use]
pub fn snapshot(value: Value) -> MetricsSnapshot {
    MetricsSnapshot::new(value)
}
