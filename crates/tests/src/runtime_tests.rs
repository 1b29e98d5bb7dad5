//! End-to-end runtime tests: real tick loops, persistence across restarts and live
//! reconfiguration.

use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use herald_core::{
    alerts::StaticMetricsProvider,
    config::AppConfig,
    events::LifecycleEvent,
    runtime::HeraldRuntime,
};
use tokio::{sync::broadcast, time::timeout};

use crate::mock_infrastructure::{
    hourly_bundle, hourly_report, memory_rule, memory_snapshot, RecordingChannel, SlowSource,
    StaticSource,
};

async fn wait_for<F>(events: &mut broadcast::Receiver<LifecycleEvent>, mut matches: F)
where
    F: FnMut(&LifecycleEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("expected event was not emitted in time");
}

#[tokio::test]
async fn test_evaluator_loop_triggers_seeded_rule() {
    let mut config = AppConfig::default();
    config.alerting.evaluation_interval_seconds = 1;
    let mut rule = memory_rule(85.0, &["recording"]);
    rule.suppression_window_ms = u64::MAX;
    config.alert_rules.push(rule);

    let channel = Arc::new(RecordingChannel::new());
    let runtime = HeraldRuntime::builder()
        .with_config(config)
        .with_metrics_provider(Arc::new(StaticMetricsProvider::new(memory_snapshot(90.0))))
        .with_channel("recording", channel.clone())
        .build()
        .await
        .expect("Failed to build runtime");
    let mut events = runtime.subscribe();

    runtime.start();
    assert!(runtime.is_running());
    wait_for(&mut events, |e| matches!(e, LifecycleEvent::AlertTriggered { .. })).await;

    let status = runtime.status();
    assert_eq!(status.rule_count, 1);
    assert_eq!(status.active_alert_count, 1);

    // The event is published before the notification goes out.
    timeout(Duration::from_secs(5), async {
        while channel.count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("notification was not delivered");
    assert_eq!(channel.count(), 1);

    runtime.shutdown().await;
    assert!(!runtime.is_running());
}

#[tokio::test]
async fn test_sqlite_artifacts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.backend = "sqlite".to_string();
    config.storage.database_url = format!("sqlite://{}/herald.db", dir.path().display());

    let source = Arc::new(StaticSource::new(hourly_bundle(Utc::now(), 6)));
    let artifact = {
        let runtime = HeraldRuntime::builder()
            .with_config(config.clone())
            .with_data_source("warehouse", source.clone())
            .build()
            .await
            .expect("Failed to build runtime");
        let definition = runtime
            .reports()
            .create_definition(hourly_report("Persistent", "warehouse"), Utc::now())
            .unwrap();
        let artifact = runtime.generate_now(&definition.id).await.unwrap();
        runtime.shutdown().await;
        artifact
    };

    let restarted = HeraldRuntime::builder()
        .with_config(config)
        .with_data_source("warehouse", source)
        .build()
        .await
        .expect("Failed to rebuild runtime");

    assert_eq!(restarted.reports().artifact_count(), 1);
    let reloaded = restarted.reports().get_artifact(&artifact.id).unwrap();
    assert_eq!(reloaded.storage_key, artifact.storage_key);
    assert_eq!(reloaded.data_point_count, 6);
    assert_eq!(reloaded.generated_at, artifact.generated_at);

    let payload = restarted.reports().read_artifact(&artifact.id).await.unwrap();
    assert_eq!(payload.len(), artifact.size_bytes);
}

#[tokio::test]
async fn test_update_config_reaches_components_while_running() {
    let runtime = HeraldRuntime::builder()
        .with_config(AppConfig::default())
        .build()
        .await
        .expect("Failed to build runtime");
    let mut events = runtime.subscribe();
    runtime.start();

    let mut config = AppConfig::default();
    config.alerting.max_escalation_level = 2;
    config.retention.artifact_retention_days = 3;
    config.scheduler.max_concurrent_reports = 1;
    runtime.update_config(config).unwrap();

    wait_for(&mut events, |e| matches!(e, LifecycleEvent::ConfigurationUpdated { .. })).await;
    assert_eq!(runtime.components().evaluator().config().max_escalation_level, 2);
    assert_eq!(runtime.components().sweeper().config().artifact_retention_days, 3);
    assert_eq!(runtime.config().scheduler.max_concurrent_reports, 1);

    let mut invalid = AppConfig::default();
    invalid.scheduler.max_concurrent_reports = 0;
    assert!(runtime.update_config(invalid).is_err());
    assert_eq!(runtime.config().scheduler.max_concurrent_reports, 1);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_loops_and_emits_stopped() {
    let source = SlowSource::new(hourly_bundle(Utc::now(), 1), Duration::from_millis(300));
    let runtime = HeraldRuntime::builder()
        .with_config(AppConfig::default())
        .with_data_source("warehouse", source.clone())
        .build()
        .await
        .expect("Failed to build runtime");
    let due = runtime
        .reports()
        .create_definition(
            hourly_report("Due at start", "warehouse"),
            Utc::now() - ChronoDuration::hours(2),
        )
        .unwrap();
    let mut events = runtime.subscribe();
    let mut shutdown = runtime.shutdown_receiver();

    runtime.start();
    wait_for(&mut events, |e| matches!(e, LifecycleEvent::ServiceStarted { .. })).await;

    // Stop while the first scheduler pass is still collecting.
    timeout(Duration::from_secs(5), async {
        while source.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scheduler pass did not start");

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown hung");
    assert!(shutdown.try_recv().is_ok());

    // The in-flight pass completed and was recorded before shutdown returned.
    let recorded = runtime.reports().get_definition(&due.id).unwrap();
    assert_eq!(recorded.generation_count, 1);
    assert!(recorded.next_fire_time > Utc::now());
    assert_eq!(runtime.reports().artifact_count(), 1);
    assert!(!runtime.components().scheduler().is_generating(&due.id));

    wait_for(&mut events, |e| matches!(e, LifecycleEvent::ReportGenerated { .. })).await;
    wait_for(&mut events, |e| matches!(e, LifecycleEvent::ServiceStopped { .. })).await;

    // Stopped runtimes still serve reads and on-demand generation.
    let definition = runtime
        .reports()
        .create_definition(hourly_report("After stop", "warehouse"), Utc::now())
        .unwrap();
    assert!(runtime.generate_now(&definition.id).await.is_ok());
}
