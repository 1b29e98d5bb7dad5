//! Integration tests for the report scheduling pipeline.
//!
//! These tests drive scheduler ticks by hand against a fully wired runtime (the tick loops are
//! never started) and verify:
//! - The concurrency bound on in-flight generations
//! - Failure isolation between definitions in the same tick
//! - Data point counts after filtering
//! - Synthetic fallback when a data source fails
//! - Per-channel distribution outcomes
//! - At most one run per definition across scheduled and on-demand generation

use std::{sync::Arc, time::Duration};

use chrono::Duration as ChronoDuration;
use herald_core::{
    config::AppConfig,
    events::LifecycleEvent,
    report::{ArtifactQuery, GenerationError, NumericFilter, OutputFormat, ReportFilters},
    runtime::{HeraldRuntime, HeraldRuntimeBuilder},
    sources::DataBundle,
    store::ArtifactStore,
};

use crate::mock_infrastructure::{
    base_time, hourly_bundle, hourly_report, FailingChannel, FailingSource, RecordingChannel,
    SelectiveFailingStore, SlowSource, StaticSource,
};

async fn runtime_with(builder: HeraldRuntimeBuilder, config: AppConfig) -> HeraldRuntime {
    builder.with_config(config).build().await.expect("Failed to build runtime")
}

#[tokio::test]
async fn test_concurrency_bound_respected() {
    let source = SlowSource::new(hourly_bundle(base_time(), 4), Duration::from_millis(40));
    let mut config = AppConfig::default();
    config.scheduler.max_concurrent_reports = 2;

    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source.clone()),
        config,
    )
    .await;

    for i in 0..5 {
        runtime
            .reports()
            .create_definition(hourly_report(&format!("Report {i}"), "warehouse"), base_time())
            .unwrap();
    }

    let tick_at = base_time() + ChronoDuration::hours(2);
    let summary = runtime.components().scheduler().tick(tick_at).await.unwrap();

    assert_eq!(summary.due, 5);
    assert_eq!(summary.generated, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(source.calls(), 5);
    assert!(
        source.max_in_flight() <= 2,
        "at most 2 pipelines may run at once, saw {}",
        source.max_in_flight()
    );

    for definition in runtime.reports().list_definitions() {
        assert_eq!(definition.generation_count, 1);
        assert!(definition.next_fire_time > tick_at);
        assert_eq!(definition.last_generated_time, Some(tick_at));
    }
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_others() {
    let store = Arc::new(SelectiveFailingStore::new());
    store.fail_writes_for("broken");

    let source = Arc::new(StaticSource::new(hourly_bundle(base_time(), 3)));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new()
            .with_data_source("warehouse", source)
            .with_artifact_store(store.clone()),
        AppConfig::default(),
    )
    .await;
    let mut events = runtime.subscribe();

    for i in 0..3 {
        runtime
            .reports()
            .create_definition(hourly_report(&format!("Healthy {i}"), "warehouse"), base_time())
            .unwrap();
    }
    let mut broken = hourly_report("Broken", "warehouse");
    broken.id = Some("broken".to_string());
    runtime.reports().create_definition(broken, base_time()).unwrap();

    let tick_at = base_time() + ChronoDuration::hours(1);
    let summary = runtime.components().scheduler().tick(tick_at).await.unwrap();

    assert_eq!(summary.due, 4);
    assert_eq!(summary.generated, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(store.len(), 3);
    assert_eq!(runtime.reports().artifact_count(), 3);

    let broken = runtime.reports().get_definition("broken").unwrap();
    assert_eq!(broken.failure_count, 1);
    assert_eq!(broken.generation_count, 0);
    assert!(broken.last_error.as_deref().is_some_and(|e| e.contains("disk quota")));
    assert!(broken.next_fire_time > tick_at, "schedule advances even on failure");

    let mut failed = 0;
    let mut generated = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            LifecycleEvent::ReportGenerationFailed { definition_id, .. } => {
                assert_eq!(definition_id, "broken");
                failed += 1;
            }
            LifecycleEvent::ReportGenerated { .. } => generated += 1,
            _ => {}
        }
    }
    assert_eq!((generated, failed), (3, 1));

    // The next tick finds nothing due: every definition moved to the following hour.
    let summary = runtime.components().scheduler().tick(tick_at).await.unwrap();
    assert_eq!(summary.due, 0);
}

#[tokio::test]
async fn test_data_point_count_reflects_filters() {
    let end = base_time();
    let source = Arc::new(StaticSource::new(hourly_bundle(end, 24)));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source),
        AppConfig::default(),
    )
    .await;

    let mut request = hourly_report("Filtered", "warehouse");
    request.filters = ReportFilters {
        start: Some(end - ChronoDuration::hours(11)),
        numeric: vec![NumericFilter {
            field: "value".to_string(),
            min: Some(150.0),
            max: Some(220.0),
        }],
        ..Default::default()
    };
    let definition = runtime.reports().create_definition(request, end).unwrap();

    let artifact = runtime.generate_now(&definition.id).await.unwrap();

    // Values run 10..=240; the last 12 hours hold 130..=240, of which 150..=220 survive.
    assert_eq!(artifact.data_point_count, 8);
    assert!(!artifact.synthetic);

    let payload = runtime.reports().read_artifact(&artifact.id).await.unwrap();
    let bundle: DataBundle = serde_json::from_slice(&payload).unwrap();
    assert_eq!(bundle.entry_count(), artifact.data_point_count);
    assert_eq!(artifact.size_bytes, payload.len());
}

#[tokio::test]
async fn test_failing_source_degrades_to_synthetic() {
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", Arc::new(FailingSource)),
        AppConfig::default(),
    )
    .await;
    let mut events = runtime.subscribe();

    let mut request = hourly_report("Degraded", "warehouse");
    request.format = OutputFormat::Csv;
    let definition = runtime.reports().create_definition(request, base_time()).unwrap();

    let artifact = runtime.generate_now(&definition.id).await.unwrap();
    assert!(artifact.synthetic);
    assert_eq!(artifact.data_point_count, 24);
    assert_eq!(artifact.format, OutputFormat::Csv);

    match events.recv().await.unwrap() {
        LifecycleEvent::ReportGenerated { synthetic, data_point_count, .. } => {
            assert!(synthetic);
            assert_eq!(data_point_count, 24);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let csv = runtime.reports().read_artifact(&artifact.id).await.unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 25, "header plus 24 rows");
}

#[tokio::test]
async fn test_distribution_is_independent_per_channel() {
    let recording = Arc::new(RecordingChannel::new());
    let source = Arc::new(StaticSource::new(hourly_bundle(base_time(), 2)));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new()
            .with_data_source("warehouse", source)
            .with_channel("recording", recording.clone())
            .with_channel("broken", Arc::new(FailingChannel)),
        AppConfig::default(),
    )
    .await;

    let mut request = hourly_report("Distributed", "warehouse");
    request.distribution_methods =
        vec!["broken".to_string(), "recording".to_string(), "unregistered".to_string()];
    request.recipients = vec!["finance@example.com".to_string()];
    let definition = runtime.reports().create_definition(request, base_time()).unwrap();

    let artifact = runtime.generate_now(&definition.id).await.unwrap();

    let deliveries = recording.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].recipients, vec!["finance@example.com".to_string()]);

    let attachment = deliveries[0].notification.attachment.as_ref().unwrap();
    let stored = runtime.reports().store().get(&artifact.storage_key).await.unwrap().unwrap();
    assert_eq!(attachment.bytes.as_ref(), stored.as_slice());
    assert_eq!(attachment.content_type, "application/json");
}

#[tokio::test]
async fn test_deactivated_definition_is_not_due() {
    let source = Arc::new(StaticSource::new(hourly_bundle(base_time(), 1)));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source.clone()),
        AppConfig::default(),
    )
    .await;

    let reports = runtime.reports();
    let definition =
        reports.create_definition(hourly_report("Paused", "warehouse"), base_time()).unwrap();
    reports.deactivate_definition(&definition.id, base_time()).unwrap();

    let tick_at = base_time() + ChronoDuration::hours(3);
    let summary = runtime.components().scheduler().tick(tick_at).await.unwrap();
    assert_eq!(summary.due, 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let source = SlowSource::new(hourly_bundle(base_time(), 1), Duration::from_millis(100));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source.clone()),
        AppConfig::default(),
    )
    .await;
    runtime.reports().create_definition(hourly_report("Slow", "warehouse"), base_time()).unwrap();

    let scheduler = runtime.components().scheduler();
    let tick_at = base_time() + ChronoDuration::hours(1);
    let (first, second) = tokio::join!(scheduler.tick(tick_at), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.tick(tick_at).await
    });

    assert_eq!(first.unwrap().generated, 1);
    assert!(second.is_none(), "overlapping tick must be skipped, not queued");
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_generate_now_rejected_while_tick_runs_definition() {
    let source = SlowSource::new(hourly_bundle(base_time(), 1), Duration::from_millis(100));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source.clone()),
        AppConfig::default(),
    )
    .await;
    let definition = runtime
        .reports()
        .create_definition(hourly_report("Slow", "warehouse"), base_time())
        .unwrap();

    let scheduler = runtime.components().scheduler();
    let tick_at = base_time() + ChronoDuration::hours(1);
    let (summary, manual) = tokio::join!(scheduler.tick(tick_at), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.is_generating(&definition.id));
        scheduler.generate_now(&definition.id, tick_at).await
    });

    assert_eq!(summary.unwrap().generated, 1);
    assert!(matches!(manual, Err(GenerationError::AlreadyRunning(_))));
    assert_eq!(source.calls(), 1);
    assert!(!scheduler.is_generating(&definition.id));

    let definition = runtime.reports().get_definition(&definition.id).unwrap();
    assert_eq!(definition.generation_count, 1);
    assert_eq!(definition.failure_count, 0);
    assert_eq!(runtime.reports().artifact_count(), 1);
}

#[tokio::test]
async fn test_tick_skips_definition_generating_on_demand() {
    let source = SlowSource::new(hourly_bundle(base_time(), 1), Duration::from_millis(100));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source.clone()),
        AppConfig::default(),
    )
    .await;
    let definition = runtime
        .reports()
        .create_definition(hourly_report("Slow", "warehouse"), base_time())
        .unwrap();

    let scheduler = runtime.components().scheduler();
    let tick_at = base_time() + ChronoDuration::hours(1);
    let (manual, summary) = tokio::join!(scheduler.generate_now(&definition.id, tick_at), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.tick(tick_at).await
    });

    let summary = summary.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.generated + summary.failed, 0);
    assert!(manual.is_ok());
    assert_eq!(source.calls(), 1);

    let definition = runtime.reports().get_definition(&definition.id).unwrap();
    assert_eq!(definition.generation_count, 1);
    assert_eq!(runtime.reports().artifact_count(), 1);

    // The on-demand run advanced the schedule, so the same instant is no longer due.
    assert_eq!(scheduler.tick(tick_at).await.unwrap().due, 0);
}

#[tokio::test]
async fn test_artifact_listing_newest_first() {
    let source = Arc::new(StaticSource::new(hourly_bundle(base_time(), 1)));
    let runtime = runtime_with(
        HeraldRuntimeBuilder::new().with_data_source("warehouse", source),
        AppConfig::default(),
    )
    .await;
    let definition = runtime
        .reports()
        .create_definition(hourly_report("Hourly", "warehouse"), base_time())
        .unwrap();

    let scheduler = runtime.components().scheduler();
    for hour in 1..=3 {
        scheduler.tick(base_time() + ChronoDuration::hours(hour)).await.unwrap();
    }

    let listed = runtime.reports().list_artifacts(&ArtifactQuery {
        definition_id: Some(definition.id.clone()),
        limit: Some(2),
        ..Default::default()
    });
    assert_eq!(listed.len(), 2);
    assert!(listed[0].generated_at > listed[1].generated_at);
    assert_eq!(listed[0].generated_at, base_time() + ChronoDuration::hours(3));
}
