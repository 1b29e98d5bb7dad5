//! Condition evaluation strategies.
//!
//! Two strategies coexist:
//!
//! - **Category extractors** for the well-known condition types. Each category (system,
//!   business, performance, security) has a table mapping a type to the snapshot metric it
//!   observes, a default comparison and a label used in alert messages.
//! - **Generic path evaluator** for any other type: the rule's dotted `path` is looked up in the
//!   snapshot and compared with the rule's operator (default `gt`).
//!
//! A well-known type always uses its extractor. Everything else needs a `path`.

use thiserror::Error;

use super::{
    metrics::MetricsSnapshot,
    types::{AlertCategory, AlertCondition, ComparisonOperator, Threshold},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("condition type '{0}' is unknown and has no metric path")]
    UnknownType(String),

    #[error("metric '{path}' is missing from the snapshot")]
    MissingMetric { path: String },

    #[error("metric '{path}' is not a number")]
    NotNumeric { path: String },
}

/// Static description of a well-known condition type.
#[derive(Debug, Clone, Copy)]
pub struct KnownCondition {
    pub condition_type: &'static str,
    pub category: AlertCategory,
    pub path: &'static str,
    /// Observe the negated metric, e.g. a drop is a negative change.
    pub negate: bool,
    pub operator: ComparisonOperator,
    pub label: &'static str,
}

const fn known(
    condition_type: &'static str,
    category: AlertCategory,
    path: &'static str,
    operator: ComparisonOperator,
    label: &'static str,
) -> KnownCondition {
    KnownCondition { condition_type, category, path, negate: false, operator, label }
}

const SYSTEM: &[KnownCondition] = &[
    known(
        "cpu_high",
        AlertCategory::System,
        "system.cpu.usage",
        ComparisonOperator::Gt,
        "cpu usage",
    ),
    known(
        "memory_high",
        AlertCategory::System,
        "system.memory.usage",
        ComparisonOperator::Gt,
        "memory usage",
    ),
    known(
        "disk_high",
        AlertCategory::System,
        "system.disk.usage",
        ComparisonOperator::Gt,
        "disk usage",
    ),
];

const BUSINESS: &[KnownCondition] = &[
    KnownCondition {
        condition_type: "revenue_drop",
        category: AlertCategory::Business,
        path: "business.revenue.change_percent",
        negate: true,
        operator: ComparisonOperator::Gt,
        label: "revenue drop",
    },
    known(
        "conversion_low",
        AlertCategory::Business,
        "business.conversion.rate",
        ComparisonOperator::Lt,
        "conversion rate",
    ),
];

const PERFORMANCE: &[KnownCondition] = &[
    known(
        "response_time_high",
        AlertCategory::Performance,
        "performance.response_time.avg",
        ComparisonOperator::Gt,
        "average response time",
    ),
    known(
        "error_rate_high",
        AlertCategory::Performance,
        "performance.error_rate",
        ComparisonOperator::Gt,
        "error rate",
    ),
];

const SECURITY: &[KnownCondition] = &[
    known(
        "threats_high",
        AlertCategory::Security,
        "security.threats.count",
        ComparisonOperator::Gt,
        "threat count",
    ),
    known(
        "failed_logins_high",
        AlertCategory::Security,
        "security.failed_logins.count",
        ComparisonOperator::Gt,
        "failed login count",
    ),
];

fn extractors(category: AlertCategory) -> &'static [KnownCondition] {
    match category {
        AlertCategory::System => SYSTEM,
        AlertCategory::Business => BUSINESS,
        AlertCategory::Performance => PERFORMANCE,
        AlertCategory::Security => SECURITY,
        AlertCategory::Custom => &[],
    }
}

/// Looks up a well-known condition type in every category table.
#[must_use]
pub fn well_known(condition_type: &str) -> Option<&'static KnownCondition> {
    [
        AlertCategory::System,
        AlertCategory::Business,
        AlertCategory::Performance,
        AlertCategory::Security,
    ]
    .into_iter()
        .flat_map(extractors)
        .find(|known| known.condition_type == condition_type)
}

/// Result of checking a condition against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionOutcome {
    pub triggered: bool,
    pub observed: f64,
    /// Human-readable description referencing the observed value and the threshold.
    pub message: String,
}

/// Evaluates `condition` against `snapshot`.
///
/// The rule's `category` selects which extractor table is consulted first; a well-known type
/// filed under another category is still recognised.
///
/// # Errors
///
/// Returns [`ConditionError`] when the type is unknown without a path, or the metric is missing
/// or not numeric. Callers treat an error as "unknown", never as "cleared".
pub fn evaluate(
    category: AlertCategory,
    condition: &AlertCondition,
    threshold: &Threshold,
    snapshot: &MetricsSnapshot,
) -> Result<ConditionOutcome, ConditionError> {
    let condition_type = condition.condition_type.trim();
    let known = extractors(category)
        .iter()
        .find(|known| known.condition_type == condition_type)
        .or_else(|| well_known(condition_type));

    let (path, negate, operator, label) = match known {
        Some(known) => (
            known.path,
            known.negate,
            condition.operator.unwrap_or(known.operator),
            known.label.to_string(),
        ),
        None => {
            let path = condition
                .path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ConditionError::UnknownType(condition_type.to_string()))?;
            (path, false, condition.operator.unwrap_or(ComparisonOperator::Gt), path.to_string())
        }
    };

    let raw = snapshot
        .get(path)
        .ok_or_else(|| ConditionError::MissingMetric { path: path.to_string() })?;
    let value = raw.as_f64().ok_or_else(|| ConditionError::NotNumeric { path: path.to_string() })?;
    let observed = if negate { -value } else { value };

    let triggered = operator.compare(observed, threshold.value);
    let unit = threshold.unit.as_deref().unwrap_or("");
    let message = format!(
        "{label} {observed}{unit} {} threshold {}{unit}",
        operator.describe(),
        threshold.value
    );

    Ok(ConditionOutcome { triggered, observed, message })
}
