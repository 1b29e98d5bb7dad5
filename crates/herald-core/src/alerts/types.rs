//! Alert type definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conditions;
use crate::{
    store::Record,
    types::{CommandError, ValidationError},
};

/// Severity level of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for AlertSeverity {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// Domain a rule watches. Selects the condition strategy for well-known types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    System,
    Business,
    Performance,
    Security,
    /// Generic dotted-path condition.
    Custom,
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::Business => "business",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Custom => "custom",
        })
    }
}

/// Comparison between the observed value (left) and the threshold (right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Gt,
    Lt,
    Eq,
    Ne,
    Gte,
    Lte,
}

impl ComparisonOperator {
    #[must_use]
    pub fn compare(self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => observed > threshold,
            Self::Lt => observed < threshold,
            Self::Eq => (observed - threshold).abs() < f64::EPSILON,
            Self::Ne => (observed - threshold).abs() >= f64::EPSILON,
            Self::Gte => observed >= threshold,
            Self::Lte => observed <= threshold,
        }
    }

    /// Verb used in alert messages.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Gt => "exceeds",
            Self::Lt => "is below",
            Self::Eq => "equals",
            Self::Ne => "differs from",
            Self::Gte => "is at or above",
            Self::Lte => "is at or below",
        }
    }
}

/// What a rule checks.
///
/// `condition_type` is either a well-known type (`cpu_high`, `memory_high`, ...) or a free
/// label for a custom rule, in which case `path` names the snapshot metric to compare.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertCondition {
    #[serde(rename = "type", default)]
    pub condition_type: String,
    /// Overrides the well-known type's default comparison.
    #[serde(default)]
    pub operator: Option<ComparisonOperator>,
    /// Dotted path into the metrics snapshot, e.g. `app.queue.depth`.
    #[serde(default)]
    pub path: Option<String>,
}

impl AlertCondition {
    #[must_use]
    pub fn new(condition_type: &str) -> Self {
        Self { condition_type: condition_type.to_string(), ..Default::default() }
    }

    #[must_use]
    pub fn with_operator(mut self, operator: ComparisonOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Threshold as supplied by the host; `value` is checked by validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdSpec {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl ThresholdSpec {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self { value: Some(value), unit: None }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

/// A rule defining when to create alerts, plus its trigger history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub condition: AlertCondition,
    pub threshold: Threshold,
    /// Channels notified when an instance triggers or escalates.
    pub actions: Vec<String>,
    /// Extra channels notified only on escalation.
    pub escalation_actions: Vec<String>,
    pub recipients: Vec<String>,
    /// Minimum time between two instances of this rule.
    pub suppression_window_ms: u64,
    pub auto_resolve: bool,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Whether `now` still falls inside the suppression window of the last trigger.
    #[must_use]
    pub fn is_suppressed(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_triggered_at else {
            return false;
        };
        let elapsed_ms = (now - last).num_milliseconds();
        elapsed_ms < 0 || u64::try_from(elapsed_ms).map_or(true, |e| e < self.suppression_window_ms)
    }
}

impl Record for AlertRule {
    fn id(&self) -> &str {
        &self.id
    }
}

fn default_true() -> bool {
    true
}

/// Host command payload for creating or updating an alert rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertRuleRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the category of a well-known condition type, otherwise `custom`.
    #[serde(default)]
    pub category: Option<AlertCategory>,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default)]
    pub condition: AlertCondition,
    #[serde(default)]
    pub threshold: ThresholdSpec,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub escalation_actions: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub suppression_window_ms: u64,
    #[serde(default)]
    pub auto_resolve: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl AlertRuleRequest {
    #[must_use]
    pub fn new(name: &str, condition: AlertCondition, threshold: ThresholdSpec) -> Self {
        Self {
            name: Some(name.to_string()),
            condition,
            threshold,
            is_active: true,
            ..Default::default()
        }
    }

    /// # Errors
    ///
    /// Returns the first missing or malformed field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(ValidationError::MissingName { entity: "alert rule" });
        }

        let condition_type = self.condition.condition_type.trim();
        if condition_type.is_empty() {
            return Err(ValidationError::MissingConditionType);
        }

        let Some(value) = self.threshold.value else {
            return Err(ValidationError::MissingThresholdValue);
        };
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteThreshold);
        }

        let has_path = self.condition.path.as_deref().is_some_and(|p| !p.trim().is_empty());
        if conditions::well_known(condition_type).is_none() && !has_path {
            return Err(ValidationError::MissingConditionPath(condition_type.to_string()));
        }

        Ok(())
    }

    /// Category stored on the rule.
    #[must_use]
    pub fn effective_category(&self) -> AlertCategory {
        self.category.unwrap_or_else(|| {
            conditions::well_known(self.condition.condition_type.trim())
                .map_or(AlertCategory::Custom, |known| known.category)
        })
    }
}

/// Lifecycle state of an alert instance.
///
/// An escalated alert keeps its status and carries `escalation_level > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertResolution {
    /// The condition cleared on a rule with `auto_resolve`.
    Auto,
    /// Resolved by a host command.
    Manual,
}

/// What the rule looked like and what was observed when the instance triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub condition: AlertCondition,
    pub threshold: Threshold,
    pub observed_value: f64,
}

/// One raised alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub status: AlertStatus,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<AlertResolution>,
    pub escalation_level: u32,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub metadata: AlertMetadata,
}

impl AlertInstance {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == AlertStatus::Resolved
    }

    #[must_use]
    pub fn is_escalated(&self) -> bool {
        !self.is_resolved() && self.escalation_level > 0
    }

    /// Start of the current escalation period.
    #[must_use]
    pub fn escalation_reference(&self) -> DateTime<Utc> {
        self.last_escalated_at.unwrap_or(self.triggered_at)
    }

    /// Marks the alert as acknowledged. Acknowledging twice keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::AlreadyResolved`] for a resolved alert.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> Result<(), CommandError> {
        match self.status {
            AlertStatus::Resolved => Err(CommandError::AlreadyResolved { id: self.id.clone() }),
            AlertStatus::Acknowledged => Ok(()),
            AlertStatus::Active => {
                self.status = AlertStatus::Acknowledged;
                self.acknowledged_at = Some(now);
                Ok(())
            }
        }
    }

    /// Moves the alert to the terminal resolved state.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::AlreadyResolved`] if the alert is already resolved.
    pub fn resolve(
        &mut self,
        now: DateTime<Utc>,
        resolution: AlertResolution,
    ) -> Result<(), CommandError> {
        if self.is_resolved() {
            return Err(CommandError::AlreadyResolved { id: self.id.clone() });
        }
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolution = Some(resolution);
        Ok(())
    }

    /// Raises the escalation level by one.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyResolved` and leaves the alert untouched once it is resolved.
    pub fn escalate(&mut self, now: DateTime<Utc>) -> Result<(), CommandError> {
        if self.is_resolved() {
            return Err(CommandError::AlreadyResolved { id: self.id.clone() });
        }
        self.escalation_level += 1;
        self.last_escalated_at = Some(now);
        Ok(())
    }
}

impl Record for AlertInstance {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Filters for listing rules. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleQuery {
    #[serde(default)]
    pub category: Option<AlertCategory>,
    #[serde(default)]
    pub severity: Option<AlertSeverity>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Filters for listing alerts. Resolved alerts are excluded unless `include_resolved` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub severity: Option<AlertSeverity>,
    #[serde(default)]
    pub category: Option<AlertCategory>,
    #[serde(default)]
    pub include_resolved: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}
