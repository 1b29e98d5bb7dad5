use std::time::Duration;

use anyhow::Result;
use herald_core::{config::AppConfig, events::LifecycleEvent, runtime::HeraldRuntime};
use tokio::{signal, sync::broadcast::error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` takes precedence; `debug` and `trace` are shorthands that raise only the Herald
/// crates. Without it `logging.level` applies to the Herald crates and everything else logs
/// at `warn`.
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.as_str();
    let filter = if let Ok(env_filter) = std::env::var("RUST_LOG") {
        if env_filter == "debug" {
            EnvFilter::new("warn,herald_core=debug,server=debug")
        } else if env_filter == "trace" {
            EnvFilter::new("warn,herald_core=trace,server=trace")
        } else {
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
                EnvFilter::new(format!("warn,herald_core={level},server={level}"))
            })
        }
    } else {
        EnvFilter::new(format!("warn,herald_core={level},server={level}"))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json();
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

/// Logs every lifecycle event until the runtime's event bus is dropped.
fn spawn_event_logger(runtime: &HeraldRuntime) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LifecycleEvent::ReportGenerationFailed { definition_id, error, .. }) => {
                    warn!(
                        definition_id = %definition_id,
                        error = %error,
                        "report generation failed"
                    );
                }
                Ok(event) => {
                    debug!(event = event.kind(), "lifecycle event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration loading failed: {e}"))?;

    init_logging(&config);
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    info!("Starting Herald");
    debug!(
        storage_backend = %config.storage.backend,
        scheduler_enabled = config.scheduler.enabled,
        alerting_enabled = config.alerting.enabled,
        seed_reports = config.reports.len(),
        seed_rules = config.alert_rules.len(),
        "Configuration loaded"
    );

    let runtime = HeraldRuntime::builder().with_config(config).build().await?;
    let event_logger = spawn_event_logger(&runtime);

    runtime.start();
    let status = runtime.status();
    info!(
        definitions = status.definition_count,
        artifacts = status.artifact_count,
        rules = status.rule_count,
        channels = ?status.channels,
        "Herald running, press Ctrl+C to stop"
    );

    shutdown_signal().await;

    if tokio::time::timeout(
        Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        runtime.shutdown(),
    )
    .await
    .is_err()
    {
        error!(
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT_SECS,
            "Graceful shutdown timed out, exiting"
        );
    }

    event_logger.abort();
    info!("Herald stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(
                error = %e,
                "Failed to install Ctrl+C handler"
            );
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Failed to install signal handler"
                );

                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        GRACEFUL_SHUTDOWN_TIMEOUT_SECS
    );
}
