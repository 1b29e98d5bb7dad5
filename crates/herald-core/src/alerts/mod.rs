//! Alert rules, alert instances and their evaluation.
//!
//! ## Components
//!
//! - **[`AlertManager`]**: registry of rules and instances; host commands and queries
//! - **[`AlertEvaluator`]**: periodic pass that triggers, escalates and auto-resolves alerts
//! - **[`conditions`]**: category extractors for well-known condition types plus the generic
//!   dotted-path evaluator
//! - **[`metrics`]**: the [`MetricsProvider`] contract and two stock providers
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Utc;
//! use herald_core::{
//!     alerts::{AlertCondition, AlertManager, AlertRuleRequest, ThresholdSpec},
//!     events::EventBus,
//! };
//!
//! let manager = AlertManager::new(EventBus::default());
//!
//! let mut request = AlertRuleRequest::new(
//!     "High memory",
//!     AlertCondition::new("memory_high"),
//!     ThresholdSpec::new(85.0).with_unit("%"),
//! );
//! request.actions = vec!["log".to_string()];
//! request.suppression_window_ms = 300_000;
//!
//! let rule = manager.create_rule(request, Utc::now()).unwrap();
//! assert_eq!(rule.category.to_string(), "system");
//! ```

pub mod conditions;
pub mod evaluator;
pub mod manager;
pub mod metrics;
pub mod types;

pub use conditions::{ConditionError, ConditionOutcome};
pub use evaluator::{AlertEvaluator, AlertingConfig, EvaluationSummary};
pub use manager::AlertManager;
pub use metrics::{
    JsonFileMetricsProvider, MetricsError, MetricsProvider, MetricsSnapshot, StaticMetricsProvider,
};
pub use types::{
    AlertCategory, AlertCondition, AlertInstance, AlertQuery, AlertResolution, AlertRule,
    AlertRuleRequest, AlertSeverity, AlertStatus, ComparisonOperator, RuleQuery, Threshold,
    ThresholdSpec,
};
