//! Herald runtime initialization and lifecycle management.
//!
//! This module wires every core component from an [`AppConfig`](crate::config::AppConfig),
//! runs the scheduler, alert evaluator and retention tick loops, and coordinates graceful
//! shutdown. It is used by the `server` binary and works the same way when embedded in a host
//! application that injects its own data sources and channels.
//!
//! # Examples
//!
//! ## Embedded Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use herald_core::{
//!     alerts::{MetricsSnapshot, StaticMetricsProvider},
//!     config::AppConfig,
//!     runtime::HeraldRuntime,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let metrics = Arc::new(StaticMetricsProvider::new(MetricsSnapshot::new(
//!         serde_json::json!({ "memory": { "usage": 42.0 } }),
//!     )));
//!
//!     let runtime = HeraldRuntime::builder()
//!         .with_config(config)
//!         .with_metrics_provider(metrics.clone())
//!         .build()
//!         .await?;
//!
//!     let mut events = runtime.subscribe();
//!     runtime.start();
//!
//!     // Host code feeds fresh snapshots and reacts to lifecycle events.
//!     while let Ok(event) = events.recv().await {
//!         println!("{}", event.kind());
//!     }
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;
pub mod ticker;

pub use builder::{HeraldRuntimeBuilder, RuntimeError};
pub use components::HeraldComponents;
pub use lifecycle::{HeraldRuntime, StatusSnapshot};
pub use ticker::{spawn_periodic, FlightPermit, SingleFlight};
