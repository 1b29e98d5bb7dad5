//! Integration tests for the retention sweeper against generated artifacts and real alerts.

use std::sync::Arc;

use chrono::{Duration, Utc};
use herald_core::{
    alerts::{AlertQuery, StaticMetricsProvider},
    config::AppConfig,
    runtime::{HeraldRuntime, HeraldRuntimeBuilder},
    store::ArtifactStore,
};

use crate::mock_infrastructure::{
    hourly_bundle, hourly_report, memory_rule, memory_snapshot, SelectiveFailingStore,
    StaticSource,
};

fn retention_config(days: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.retention.artifact_retention_days = days;
    config
}

async fn build(builder: HeraldRuntimeBuilder, config: AppConfig) -> HeraldRuntime {
    let source = Arc::new(StaticSource::new(hourly_bundle(Utc::now(), 3)));
    builder
        .with_config(config)
        .with_data_source("warehouse", source)
        .build()
        .await
        .expect("Failed to build runtime")
}

#[tokio::test]
async fn test_one_day_retention_removes_old_keeps_recent() {
    let runtime = build(HeraldRuntimeBuilder::new(), retention_config(1)).await;
    let now = Utc::now();
    let definition =
        runtime.reports().create_definition(hourly_report("Daily", "warehouse"), now).unwrap();

    let scheduler = runtime.components().scheduler();
    let old = scheduler.generate_now(&definition.id, now - Duration::days(2)).await.unwrap();
    let recent = scheduler.generate_now(&definition.id, now - Duration::hours(12)).await.unwrap();

    let summary = runtime.components().sweeper().tick(now).await.unwrap();
    assert_eq!(summary.artifacts_removed, 1);
    assert_eq!(summary.artifact_failures, 0);

    assert!(runtime.reports().get_artifact(&old.id).is_none());
    assert!(runtime.reports().store().get(&old.storage_key).await.unwrap().is_none());
    assert!(runtime.reports().get_artifact(&recent.id).is_some());
    assert!(runtime.reports().read_artifact(&recent.id).await.is_ok());
}

#[tokio::test]
async fn test_failed_payload_delete_is_retried_next_sweep() {
    let store = Arc::new(SelectiveFailingStore::new());
    let runtime =
        build(HeraldRuntimeBuilder::new().with_artifact_store(store.clone()), retention_config(1))
            .await;
    let now = Utc::now();
    let definition =
        runtime.reports().create_definition(hourly_report("Daily", "warehouse"), now).unwrap();
    let old = runtime
        .components()
        .scheduler()
        .generate_now(&definition.id, now - Duration::days(3))
        .await
        .unwrap();

    store.set_fail_deletes(true);
    let summary = runtime.components().sweeper().sweep(now).await;
    assert_eq!(summary.artifacts_removed, 0);
    assert_eq!(summary.artifact_failures, 1);
    assert!(runtime.reports().get_artifact(&old.id).is_some());

    store.set_fail_deletes(false);
    let summary = runtime.components().sweeper().sweep(now).await;
    assert_eq!(summary.artifacts_removed, 1);
    assert!(runtime.reports().get_artifact(&old.id).is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_resolved_alerts_pruned_after_grace_period() {
    let metrics = Arc::new(StaticMetricsProvider::new(memory_snapshot(95.0)));
    let runtime =
        build(HeraldRuntimeBuilder::new().with_metrics_provider(metrics), AppConfig::default())
            .await;
    let now = Utc::now();
    let triggered_at = now - Duration::days(10);
    runtime.alerts().create_rule(memory_rule(85.0, &[]), triggered_at).unwrap();

    runtime.components().evaluator().tick(triggered_at).await.unwrap();
    let alert_id = runtime.alerts().unresolved_alerts()[0].id.clone();
    runtime.alerts().resolve_alert(&alert_id, now - Duration::days(8)).unwrap();

    let summary = runtime.components().sweeper().sweep(now).await;
    assert_eq!(summary.alerts_removed, 1);
    assert!(runtime.alerts().get_alert(&alert_id).is_none());
    assert!(runtime
        .alerts()
        .list_alerts(&AlertQuery { include_resolved: true, ..Default::default() })
        .is_empty());
}
