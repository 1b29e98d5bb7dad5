//! Alert rule evaluation and the alert instance state machine.
//!
//! One evaluation pass runs three steps against a metrics snapshot:
//!
//! 1. **Trigger**: every active rule outside its suppression window has its condition checked;
//!    a true condition creates a new instance and notifies the rule's actions.
//! 2. **Escalation sweep**: unresolved instances whose current escalation period has lasted at
//!    least `escalation_timeout_seconds` move up one level (capped at `max_escalation_level`)
//!    and are re-notified on `actions + escalation_actions`.
//! 3. **Auto-resolve sweep**: unresolved instances of `auto_resolve` rules are resolved when the
//!    condition evaluates to false. An evaluation error never resolves an alert.
//!
//! A rule whose condition cannot be evaluated is logged and skipped; other rules are unaffected.

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    conditions::{self, ConditionError, ConditionOutcome},
    manager::AlertManager,
    metrics::{MetricsProvider, MetricsSnapshot},
    types::{AlertInstance, AlertMetadata, AlertResolution, AlertRule, AlertStatus},
};
use crate::{
    distribution::{Dispatcher, Notification},
    events::{EventBus, LifecycleEvent},
    runtime::ticker::SingleFlight,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between evaluation passes (default: 30).
    #[serde(default = "default_evaluation_interval_seconds")]
    pub evaluation_interval_seconds: u64,

    /// Age of an escalation period before the next level (default: 900).
    #[serde(default = "default_escalation_timeout_seconds")]
    pub escalation_timeout_seconds: u64,

    /// Highest escalation level an alert can reach (default: 5).
    #[serde(default = "default_max_escalation_level")]
    pub max_escalation_level: u32,

    /// JSON file read by the file metrics provider on every pass.
    #[serde(default)]
    pub metrics_snapshot_path: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_evaluation_interval_seconds() -> u64 {
    30
}

fn default_escalation_timeout_seconds() -> u64 {
    900
}

fn default_max_escalation_level() -> u32 {
    5
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            evaluation_interval_seconds: default_evaluation_interval_seconds(),
            escalation_timeout_seconds: default_escalation_timeout_seconds(),
            max_escalation_level: default_max_escalation_level(),
            metrics_snapshot_path: None,
        }
    }
}

/// Outcome counts of one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub suppressed: usize,
    pub triggered: usize,
    pub errors: usize,
    pub escalated: usize,
    pub resolved: usize,
}

pub struct AlertEvaluator {
    config: ArcSwap<AlertingConfig>,
    alerts: Arc<AlertManager>,
    metrics: Arc<dyn MetricsProvider>,
    dispatcher: Arc<Dispatcher>,
    events: EventBus,
    guard: SingleFlight,
}

impl AlertEvaluator {
    #[must_use]
    pub fn new(
        config: AlertingConfig,
        alerts: Arc<AlertManager>,
        metrics: Arc<dyn MetricsProvider>,
        dispatcher: Arc<Dispatcher>,
        events: EventBus,
    ) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            alerts,
            metrics,
            dispatcher,
            events,
            guard: SingleFlight::new("alert-evaluator"),
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<AlertingConfig> {
        self.config.load_full()
    }

    pub fn update_config(&self, config: AlertingConfig) {
        self.config.store(Arc::new(config));
    }

    /// One guarded pass: polls the metrics provider and evaluates.
    ///
    /// Returns `None` if the previous pass is still running. If the snapshot cannot be read
    /// only the escalation sweep runs.
    pub async fn tick(&self, now: DateTime<Utc>) -> Option<EvaluationSummary> {
        let _permit = self.guard.try_acquire()?;

        if !self.config.load().enabled {
            debug!("alerting disabled, skipping tick");
            return Some(EvaluationSummary::default());
        }

        match self.metrics.snapshot().await {
            Ok(snapshot) => Some(self.evaluate(now, &snapshot).await),
            Err(e) => {
                warn!(error = %e, "metrics snapshot unavailable, running escalation sweep only");
                let escalated = self.escalation_sweep(now).await;
                Some(EvaluationSummary { escalated, ..Default::default() })
            }
        }
    }

    /// Runs trigger, escalation and auto-resolve against `snapshot`.
    pub async fn evaluate(
        &self,
        now: DateTime<Utc>,
        snapshot: &MetricsSnapshot,
    ) -> EvaluationSummary {
        let mut summary = EvaluationSummary::default();
        let mut outcomes: HashMap<String, Result<ConditionOutcome, ConditionError>> =
            HashMap::new();

        for rule in self.alerts.active_rules() {
            if rule.is_suppressed(now) {
                debug!(rule_id = %rule.id, "rule within suppression window, skipping");
                summary.suppressed += 1;
                continue;
            }

            summary.evaluated += 1;
            let outcome = check(&rule, snapshot);
            match &outcome {
                Ok(outcome) if outcome.triggered => {
                    if self.trigger(&rule, outcome, now).await {
                        summary.triggered += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        rule_name = %rule.name,
                        error = %e,
                        "rule evaluation failed"
                    );
                    summary.errors += 1;
                }
            }
            outcomes.insert(rule.id.clone(), outcome);
        }

        summary.escalated = self.escalation_sweep(now).await;
        summary.resolved = self.auto_resolve_sweep(now, snapshot, &mut outcomes);

        if summary.triggered + summary.escalated + summary.resolved > 0 {
            info!(
                triggered = summary.triggered,
                escalated = summary.escalated,
                resolved = summary.resolved,
                errors = summary.errors,
                "alert evaluation complete"
            );
        }
        summary
    }

    async fn trigger(
        &self,
        rule: &AlertRule,
        outcome: &ConditionOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        if self.alerts.record_trigger(&rule.id, now).is_none() {
            return false;
        }

        let alert = AlertInstance {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            category: rule.category,
            status: AlertStatus::Active,
            message: outcome.message.clone(),
            triggered_at: now,
            acknowledged_at: None,
            resolved_at: None,
            resolution: None,
            escalation_level: 0,
            last_escalated_at: None,
            metadata: AlertMetadata {
                condition: rule.condition.clone(),
                threshold: rule.threshold.clone(),
                observed_value: outcome.observed,
            },
        };
        self.alerts.insert_alert(alert.clone());

        warn!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            severity = %rule.severity,
            message = %alert.message,
            "alert triggered"
        );
        self.events.emit(LifecycleEvent::AlertTriggered {
            alert_id: alert.id.clone(),
            rule_id: rule.id.clone(),
            severity: rule.severity,
            message: alert.message.clone(),
            at: now,
        });

        self.dispatcher
            .dispatch(&Notification::alert_triggered(&alert), &rule.recipients, &rule.actions)
            .await;
        true
    }

    async fn escalation_sweep(&self, now: DateTime<Utc>) -> usize {
        let config = self.config.load_full();
        let timeout_secs = i64::try_from(config.escalation_timeout_seconds).unwrap_or(i64::MAX);
        let timeout = Duration::try_seconds(timeout_secs).unwrap_or(Duration::MAX);
        let notify_acknowledged = self.dispatcher.config().notify_acknowledged;
        let mut escalated = 0;

        for alert in self.alerts.unresolved_alerts() {
            if alert.escalation_level >= config.max_escalation_level
                || now - alert.escalation_reference() < timeout
            {
                continue;
            }
            let Some(rule) = self.alerts.get_rule(&alert.rule_id) else {
                continue;
            };
            let Some(alert) = self.alerts.escalate_alert(&alert.id, now) else {
                continue;
            };
            escalated += 1;

            info!(
                alert_id = %alert.id,
                rule_id = %alert.rule_id,
                escalation_level = alert.escalation_level,
                "alert escalated"
            );
            self.events.emit(LifecycleEvent::AlertEscalated {
                alert_id: alert.id.clone(),
                rule_id: alert.rule_id.clone(),
                escalation_level: alert.escalation_level,
                at: now,
            });

            if alert.status == AlertStatus::Acknowledged && !notify_acknowledged {
                debug!(alert_id = %alert.id, "acknowledged, escalation not re-notified");
                continue;
            }

            let mut methods = rule.actions.clone();
            methods.extend(rule.escalation_actions.iter().cloned());
            self.dispatcher
                .dispatch(&Notification::alert_escalated(&alert), &rule.recipients, &methods)
                .await;
        }

        escalated
    }

    fn auto_resolve_sweep(
        &self,
        now: DateTime<Utc>,
        snapshot: &MetricsSnapshot,
        outcomes: &mut HashMap<String, Result<ConditionOutcome, ConditionError>>,
    ) -> usize {
        let mut resolved = 0;

        for alert in self.alerts.unresolved_alerts() {
            let Some(rule) = self.alerts.get_rule(&alert.rule_id) else {
                continue;
            };
            if !rule.is_active || !rule.auto_resolve {
                continue;
            }

            let outcome = outcomes.entry(rule.id.clone()).or_insert_with(|| check(&rule, snapshot));
            match outcome {
                Ok(outcome) if !outcome.triggered => {
                    if self.alerts.resolve_with(&alert.id, now, AlertResolution::Auto).is_ok() {
                        resolved += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        alert_id = %alert.id,
                        error = %e,
                        "condition unknown, not auto-resolving"
                    );
                }
            }
        }

        resolved
    }
}

fn check(rule: &AlertRule, snapshot: &MetricsSnapshot) -> Result<ConditionOutcome, ConditionError> {
    conditions::evaluate(rule.category, &rule.condition, &rule.threshold, snapshot)
}
