//! Integration tests for alert rule evaluation and the alert instance lifecycle.
//!
//! Evaluator ticks are driven by hand with explicit timestamps so suppression windows and
//! escalation timeouts can be checked at their exact boundaries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use herald_core::{
    alerts::{
        AlertCategory, AlertCondition, AlertQuery, AlertResolution, AlertRuleRequest,
        AlertSeverity, AlertStatus, ComparisonOperator, StaticMetricsProvider, ThresholdSpec,
    },
    config::AppConfig,
    distribution::NotificationKind,
    events::LifecycleEvent,
    runtime::HeraldRuntime,
};
use tokio::sync::broadcast;

use crate::mock_infrastructure::{
    base_time, memory_rule, memory_snapshot, snapshot, PanickingChannel, RecordingChannel,
};

struct Harness {
    runtime: HeraldRuntime,
    metrics: Arc<StaticMetricsProvider>,
    channel: Arc<RecordingChannel>,
    events: broadcast::Receiver<LifecycleEvent>,
}

impl Harness {
    async fn new(config: AppConfig) -> Self {
        let metrics = Arc::new(StaticMetricsProvider::new(memory_snapshot(0.0)));
        let channel = Arc::new(RecordingChannel::new());
        let runtime = HeraldRuntime::builder()
            .with_config(config)
            .with_metrics_provider(metrics.clone())
            .with_channel("recording", channel.clone())
            .with_channel("exploding", Arc::new(PanickingChannel))
            .build()
            .await
            .expect("Failed to build runtime");
        let events = runtime.subscribe();
        Self { runtime, metrics, channel, events }
    }

    async fn tick(&self, at: DateTime<Utc>) {
        self.runtime.components().evaluator().tick(at).await.expect("tick should not overlap");
    }

    fn drain(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

#[tokio::test]
async fn test_memory_high_triggers_above_threshold() {
    let mut harness = Harness::new(AppConfig::default()).await;
    let request = memory_rule(85.0, &["recording"]);
    let rule = harness.runtime.alerts().create_rule(request, base_time()).unwrap();
    assert_eq!(rule.category, AlertCategory::System);

    harness.metrics.set(memory_snapshot(90.0));
    harness.tick(base_time()).await;

    let alerts = harness.runtime.alerts().list_alerts(&AlertQuery::default());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, rule.id);
    assert_eq!(alerts[0].status, AlertStatus::Active);
    assert!(alerts[0].message.contains("85"), "message was {}", alerts[0].message);
    assert!((alerts[0].metadata.observed_value - 90.0).abs() < f64::EPSILON);

    let events = harness.drain();
    assert!(matches!(events.as_slice(), [LifecycleEvent::AlertTriggered { .. }]));

    let deliveries = harness.channel.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].notification.kind, NotificationKind::AlertTriggered);
    assert_eq!(deliveries[0].recipients, vec!["ops@example.com".to_string()]);
}

#[tokio::test]
async fn test_memory_below_threshold_does_not_trigger() {
    let mut harness = Harness::new(AppConfig::default()).await;
    harness.runtime.alerts().create_rule(memory_rule(85.0, &["recording"]), base_time()).unwrap();

    harness.metrics.set(memory_snapshot(80.0));
    harness.tick(base_time()).await;

    assert_eq!(harness.runtime.alerts().active_alert_count(), 0);
    assert!(harness.drain().is_empty());
    assert_eq!(harness.channel.count(), 0);
}

#[tokio::test]
async fn test_suppression_window_limits_to_one_instance() {
    let harness = Harness::new(AppConfig::default()).await;
    let mut request = memory_rule(85.0, &[]);
    request.suppression_window_ms = 10 * 60 * 1000;
    let rule = harness.runtime.alerts().create_rule(request, base_time()).unwrap();
    harness.metrics.set(memory_snapshot(95.0));

    for minutes in [0, 2, 4, 6, 8] {
        harness.tick(base_time() + Duration::minutes(minutes)).await;
    }
    assert_eq!(harness.runtime.alerts().unresolved_alerts().len(), 1);

    // The window is measured from the first trigger; at exactly W it no longer suppresses.
    harness.tick(base_time() + Duration::minutes(10)).await;
    assert_eq!(harness.runtime.alerts().unresolved_alerts().len(), 2);

    let rule = harness.runtime.alerts().get_rule(&rule.id).unwrap();
    assert_eq!(rule.trigger_count, 2);
    assert_eq!(rule.last_triggered_at, Some(base_time() + Duration::minutes(10)));
}

#[tokio::test]
async fn test_escalation_at_exact_timeout_and_not_before_next() {
    let mut config = AppConfig::default();
    config.alerting.escalation_timeout_seconds = 900;
    let mut harness = Harness::new(config).await;

    let mut request = memory_rule(85.0, &["recording"]);
    request.escalation_actions = vec!["recording".to_string()];
    request.suppression_window_ms = u64::MAX;
    harness.runtime.alerts().create_rule(request, base_time()).unwrap();

    harness.metrics.set(memory_snapshot(99.0));
    harness.tick(base_time()).await;
    let alert_id = harness.runtime.alerts().unresolved_alerts()[0].id.clone();
    harness.drain();

    harness.tick(base_time() + Duration::seconds(899)).await;
    assert_eq!(harness.runtime.alerts().get_alert(&alert_id).unwrap().escalation_level, 0);

    let first = base_time() + Duration::seconds(900);
    harness.tick(first).await;
    let alert = harness.runtime.alerts().get_alert(&alert_id).unwrap();
    assert_eq!(alert.escalation_level, 1);
    assert_eq!(alert.last_escalated_at, Some(first));
    assert!(harness.drain().iter().any(|e| matches!(
        e,
        LifecycleEvent::AlertEscalated { escalation_level: 1, .. }
    )));

    harness.tick(first + Duration::seconds(899)).await;
    assert_eq!(harness.runtime.alerts().get_alert(&alert_id).unwrap().escalation_level, 1);

    harness.tick(first + Duration::seconds(900)).await;
    assert_eq!(harness.runtime.alerts().get_alert(&alert_id).unwrap().escalation_level, 2);

    // Trigger plus two escalations; the escalation methods are deduplicated with the actions.
    let kinds: Vec<_> =
        harness.channel.deliveries().iter().map(|d| d.notification.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::AlertTriggered,
            NotificationKind::AlertEscalated,
            NotificationKind::AlertEscalated
        ]
    );
}

#[tokio::test]
async fn test_escalation_capped_at_max_level() {
    let mut config = AppConfig::default();
    config.alerting.escalation_timeout_seconds = 60;
    config.alerting.max_escalation_level = 2;
    let harness = Harness::new(config).await;

    let mut request = memory_rule(85.0, &[]);
    request.suppression_window_ms = u64::MAX;
    harness.runtime.alerts().create_rule(request, base_time()).unwrap();
    harness.metrics.set(memory_snapshot(99.0));

    for minutes in 0..10 {
        harness.tick(base_time() + Duration::minutes(minutes)).await;
    }

    let alerts = harness.runtime.alerts().unresolved_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].escalation_level, 2);
}

#[tokio::test]
async fn test_acknowledged_alert_escalates_without_notification() {
    let mut config = AppConfig::default();
    config.alerting.escalation_timeout_seconds = 60;
    let harness = Harness::new(config).await;

    let mut request = memory_rule(85.0, &["recording"]);
    request.suppression_window_ms = u64::MAX;
    harness.runtime.alerts().create_rule(request, base_time()).unwrap();
    harness.metrics.set(memory_snapshot(99.0));
    harness.tick(base_time()).await;

    let alert_id = harness.runtime.alerts().unresolved_alerts()[0].id.clone();
    let acknowledged = harness
        .runtime
        .alerts()
        .acknowledge_alert(&alert_id, base_time() + Duration::seconds(10))
        .unwrap();
    assert_eq!(acknowledged.status, AlertStatus::Acknowledged);

    harness.tick(base_time() + Duration::seconds(60)).await;

    let alert = harness.runtime.alerts().get_alert(&alert_id).unwrap();
    assert_eq!(alert.escalation_level, 1);
    assert_eq!(alert.status, AlertStatus::Acknowledged);
    assert_eq!(harness.channel.count(), 1, "only the trigger was delivered");
}

#[tokio::test]
async fn test_auto_resolve_when_condition_clears() {
    let mut harness = Harness::new(AppConfig::default()).await;
    let mut request = memory_rule(85.0, &["recording"]);
    request.auto_resolve = true;
    harness.runtime.alerts().create_rule(request, base_time()).unwrap();

    harness.metrics.set(memory_snapshot(92.0));
    harness.tick(base_time()).await;
    let alert_id = harness.runtime.alerts().unresolved_alerts()[0].id.clone();

    harness.metrics.set(memory_snapshot(70.0));
    let resolved_at = base_time() + Duration::minutes(1);
    harness.tick(resolved_at).await;

    let alert = harness.runtime.alerts().get_alert(&alert_id).unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert_eq!(alert.resolution, Some(AlertResolution::Auto));
    assert_eq!(alert.resolved_at, Some(resolved_at));
    assert_eq!(harness.runtime.alerts().active_alert_count(), 0);

    let events = harness.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::AlertResolved { resolution: AlertResolution::Auto, .. }
    )));
    assert_eq!(harness.channel.count(), 1, "resolution is not dispatched");
}

#[tokio::test]
async fn test_missing_metric_is_isolated_per_rule() {
    let harness = Harness::new(AppConfig::default()).await;
    harness.runtime.alerts().create_rule(memory_rule(85.0, &[]), base_time()).unwrap();

    let mut custom = AlertRuleRequest::new(
        "Queue depth",
        AlertCondition::new("queue_depth")
            .with_path("queues.jobs.depth")
            .with_operator(ComparisonOperator::Gte),
        ThresholdSpec::new(100.0),
    );
    custom.severity = AlertSeverity::High;
    harness.runtime.alerts().create_rule(custom, base_time()).unwrap();

    // No memory section at all: the memory rule errors, the custom rule still evaluates.
    harness.metrics.set(snapshot(serde_json::json!({ "queues": { "jobs": { "depth": 100 } } })));
    let summary = harness.runtime.components().evaluator().tick(base_time()).await.unwrap();

    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.triggered, 1);

    let alerts = harness.runtime.alerts().list_alerts(&AlertQuery {
        severity: Some(AlertSeverity::High),
        ..Default::default()
    });
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::Custom);
}

#[tokio::test]
async fn test_panicking_channel_does_not_stop_later_rules() {
    let harness = Harness::new(AppConfig::default()).await;
    let mut first = memory_rule(85.0, &["exploding"]);
    first.name = Some("A first".to_string());
    let first = harness.runtime.alerts().create_rule(first, base_time()).unwrap();
    let mut second = memory_rule(85.0, &["recording"]);
    second.name = Some("B second".to_string());
    let second = harness.runtime.alerts().create_rule(second, base_time()).unwrap();

    harness.metrics.set(memory_snapshot(90.0));
    let summary = harness.runtime.components().evaluator().tick(base_time()).await.unwrap();

    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.triggered, 2);
    assert_eq!(harness.runtime.alerts().get_rule(&first.id).unwrap().trigger_count, 1);
    assert_eq!(harness.runtime.alerts().get_rule(&second.id).unwrap().trigger_count, 1);
    assert_eq!(harness.channel.count(), 1);

    // The evaluator guard was released, so the next pass runs normally.
    let later = base_time() + Duration::hours(2);
    assert!(harness.runtime.components().evaluator().tick(later).await.is_some());
}

#[tokio::test]
async fn test_manual_resolve_then_acknowledge_fails() {
    let harness = Harness::new(AppConfig::default()).await;
    harness.runtime.alerts().create_rule(memory_rule(85.0, &[]), base_time()).unwrap();
    harness.metrics.set(memory_snapshot(90.0));
    harness.tick(base_time()).await;

    let alert_id = harness.runtime.alerts().unresolved_alerts()[0].id.clone();
    let resolved = harness.runtime.alerts().resolve_alert(&alert_id, base_time()).unwrap();
    assert_eq!(resolved.resolution, Some(AlertResolution::Manual));

    assert!(harness.runtime.alerts().acknowledge_alert(&alert_id, base_time()).is_err());
    assert!(harness.runtime.alerts().list_alerts(&AlertQuery::default()).is_empty());
    assert_eq!(
        harness
            .runtime
            .alerts()
            .list_alerts(&AlertQuery { include_resolved: true, ..Default::default() })
            .len(),
        1
    );
}
