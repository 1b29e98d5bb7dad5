//! Alert rule and alert instance registries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{
    AlertInstance, AlertQuery, AlertResolution, AlertRule, AlertRuleRequest, RuleQuery, Threshold,
};
use crate::{
    events::{EventBus, LifecycleEvent},
    store::Repository,
    types::CommandError,
};

/// Alerts returned by [`AlertManager::list_alerts`] when the query sets no limit.
pub const DEFAULT_ALERT_LIMIT: usize = 50;

const RULE: &str = "alert rule";
const ALERT: &str = "alert";

/// Central store for alert rules and alert instances.
///
/// Host commands (rule CRUD, acknowledge, resolve, delete) go through here. Instance creation,
/// escalation and auto-resolution are driven by the [`AlertEvaluator`](super::AlertEvaluator).
pub struct AlertManager {
    rules: Repository<AlertRule>,
    alerts: Repository<AlertInstance>,
    events: EventBus,
}

impl AlertManager {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self { rules: Repository::new(), alerts: Repository::new(), events }
    }

    /// Validates and registers a new rule.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `AlreadyExists` if the requested id is taken.
    pub fn create_rule(
        &self,
        request: AlertRuleRequest,
        now: DateTime<Utc>,
    ) -> Result<Arc<AlertRule>, CommandError> {
        request.validate()?;

        let id = request.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let rule = AlertRule {
            id: id.clone(),
            name: request.name.clone().unwrap_or_default().trim().to_string(),
            description: request.description.clone(),
            category: request.effective_category(),
            severity: request.severity,
            condition: request.condition.clone(),
            threshold: Threshold {
                value: request.threshold.value.unwrap_or_default(),
                unit: request.threshold.unit.clone(),
            },
            actions: request.actions,
            escalation_actions: request.escalation_actions,
            recipients: request.recipients,
            suppression_window_ms: request.suppression_window_ms,
            auto_resolve: request.auto_resolve,
            is_active: request.is_active,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: now,
            updated_at: now,
        };

        if !self.rules.insert_new(rule) {
            return Err(CommandError::AlreadyExists { entity: RULE, id });
        }

        info!(rule_id = %id, "alert rule created");
        self.rules.get(&id).ok_or_else(|| CommandError::not_found(RULE, &id))
    }

    /// Replaces a rule's configuration, keeping its trigger history.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `NotFound` for an unknown id.
    pub fn update_rule(
        &self,
        id: &str,
        request: AlertRuleRequest,
        now: DateTime<Utc>,
    ) -> Result<Arc<AlertRule>, CommandError> {
        request.validate()?;
        let category = request.effective_category();

        let updated = self
            .rules
            .update(id, |rule| {
                rule.name = request.name.unwrap_or_default().trim().to_string();
                rule.description = request.description;
                rule.category = category;
                rule.severity = request.severity;
                rule.condition = request.condition;
                rule.threshold = Threshold {
                    value: request.threshold.value.unwrap_or_default(),
                    unit: request.threshold.unit,
                };
                rule.actions = request.actions;
                rule.escalation_actions = request.escalation_actions;
                rule.recipients = request.recipients;
                rule.suppression_window_ms = request.suppression_window_ms;
                rule.auto_resolve = request.auto_resolve;
                rule.is_active = request.is_active;
                rule.updated_at = now;
            })
            .ok_or_else(|| CommandError::not_found(RULE, id))?;

        info!(rule_id = %id, "alert rule updated");
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn set_rule_active(
        &self,
        id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Arc<AlertRule>, CommandError> {
        let updated = self
            .rules
            .update(id, |rule| {
                rule.is_active = active;
                rule.updated_at = now;
            })
            .ok_or_else(|| CommandError::not_found(RULE, id))?;

        info!(rule_id = %id, active, "alert rule activation changed");
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn deactivate_rule(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<AlertRule>, CommandError> {
        self.set_rule_active(id, false, now)
    }

    /// Removes a rule. Its unresolved instances are no longer escalated or auto-resolved and
    /// wait for a manual resolution.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn delete_rule(&self, id: &str) -> Result<Arc<AlertRule>, CommandError> {
        let removed = self.rules.delete(id).ok_or_else(|| CommandError::not_found(RULE, id))?;
        info!(rule_id = %id, "alert rule deleted");
        Ok(removed)
    }

    #[must_use]
    pub fn get_rule(&self, id: &str) -> Option<Arc<AlertRule>> {
        self.rules.get(id)
    }

    /// Rules matching `query`, ordered by name.
    #[must_use]
    pub fn list_rules(&self, query: &RuleQuery) -> Vec<Arc<AlertRule>> {
        let mut rules = self.rules.filter(|rule| {
            query.category.map_or(true, |c| rule.category == c)
                && query.severity.map_or(true, |s| rule.severity == s)
                && query.is_active.map_or(true, |a| rule.is_active == a)
        });
        rules.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rules
    }

    #[must_use]
    pub fn active_rules(&self) -> Vec<Arc<AlertRule>> {
        self.list_rules(&RuleQuery { is_active: Some(true), ..Default::default() })
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn get_alert(&self, id: &str) -> Option<Arc<AlertInstance>> {
        self.alerts.get(id)
    }

    /// Alerts matching `query`, newest first.
    #[must_use]
    pub fn list_alerts(&self, query: &AlertQuery) -> Vec<Arc<AlertInstance>> {
        let mut alerts = self.alerts.filter(|alert| {
            (query.include_resolved || !alert.is_resolved())
                && query.severity.map_or(true, |s| alert.severity == s)
                && query.category.map_or(true, |c| alert.category == c)
        });
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at).then_with(|| a.id.cmp(&b.id)));
        alerts.truncate(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT));
        alerts
    }

    /// Every unresolved alert, unordered.
    #[must_use]
    pub fn unresolved_alerts(&self) -> Vec<Arc<AlertInstance>> {
        self.alerts.filter(|alert| !alert.is_resolved())
    }

    /// Every alert including resolved ones, unordered.
    #[must_use]
    pub fn all_alerts(&self) -> Vec<Arc<AlertInstance>> {
        self.alerts.list()
    }

    #[must_use]
    pub fn active_alert_count(&self) -> usize {
        self.alerts.filter(|alert| !alert.is_resolved()).len()
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id or `AlreadyResolved` for a resolved alert.
    pub fn acknowledge_alert(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<AlertInstance>, CommandError> {
        let updated = self
            .alerts
            .try_update(id, |alert| alert.acknowledge(now))?
            .ok_or_else(|| CommandError::not_found(ALERT, id))?;

        info!(alert_id = %id, "alert acknowledged");
        Ok(updated)
    }

    /// Manually resolves an alert.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id or `AlreadyResolved` for a resolved alert.
    pub fn resolve_alert(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<AlertInstance>, CommandError> {
        self.resolve_with(id, now, AlertResolution::Manual)
    }

    pub(crate) fn resolve_with(
        &self,
        id: &str,
        now: DateTime<Utc>,
        resolution: AlertResolution,
    ) -> Result<Arc<AlertInstance>, CommandError> {
        let resolved = self
            .alerts
            .try_update(id, |alert| alert.resolve(now, resolution))?
            .ok_or_else(|| CommandError::not_found(ALERT, id))?;

        info!(alert_id = %id, rule_id = %resolved.rule_id, ?resolution, "alert resolved");
        self.events.emit(LifecycleEvent::AlertResolved {
            alert_id: resolved.id.clone(),
            rule_id: resolved.rule_id.clone(),
            resolution,
            at: now,
        });
        Ok(resolved)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn delete_alert(&self, id: &str) -> Result<Arc<AlertInstance>, CommandError> {
        let removed = self.alerts.delete(id).ok_or_else(|| CommandError::not_found(ALERT, id))?;
        info!(alert_id = %id, "alert deleted");
        Ok(removed)
    }

    /// Records that `rule_id` fired at `now`. Returns `None` if the rule was deleted.
    pub(crate) fn record_trigger(
        &self,
        rule_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Arc<AlertRule>> {
        self.rules.update(rule_id, |rule| {
            rule.last_triggered_at = Some(now);
            rule.trigger_count += 1;
        })
    }

    pub(crate) fn insert_alert(&self, alert: AlertInstance) {
        self.alerts.upsert(alert);
    }

    /// Escalates an unresolved alert. Returns `None` if it was deleted or resolved meanwhile.
    pub(crate) fn escalate_alert(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Option<Arc<AlertInstance>> {
        match self.alerts.try_update(id, |alert| alert.escalate(now)) {
            Ok(escalated) => escalated,
            Err(e) => {
                debug!(alert_id = %id, error = %e, "alert no longer escalatable");
                None
            }
        }
    }

    pub(crate) fn remove_alert(&self, id: &str) -> Option<Arc<AlertInstance>> {
        self.alerts.delete(id)
    }
}
