//! # Herald Core
//!
//! Core library for the Herald reporting and alerting engine.
//!
//! This crate provides the foundational components for:
//!
//! - **[`report`]**: Scheduled report definitions, next-fire-time calculation, filtering and
//!   formatting (JSON, CSV, text, document), and the bounded-concurrency generation scheduler.
//!
//! - **[`sources`]**: Named data source adapters with a synthetic fallback so a failing source
//!   degrades a report instead of failing it.
//!
//! - **[`alerts`]**: Alert rules, condition evaluation against metrics snapshots, and the alert
//!   instance state machine (trigger, suppression, escalation, resolution).
//!
//! - **[`distribution`]**: Notification channels and the dispatcher that fans a report or alert
//!   out to every requested channel independently.
//!
//! - **[`retention`]**: Periodic pruning of expired artifacts and old resolved alerts.
//!
//! - **[`store`]**: Record registries and artifact persistence (in-memory or `SQLite`).
//!
//! - **[`events`]**: Lifecycle notifications for host subscribers.
//!
//! - **[`runtime`]**: Component wiring, tick loops and graceful shutdown.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           HeraldRuntime                          │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌──────────────────┐  │
//! │  │ ReportScheduler │  │ AlertEvaluator  │  │ RetentionSweeper │  │
//! │  └───┬─────────┬───┘  └───┬─────────┬───┘  └────────┬─────────┘  │
//! │      │         │          │         │               │            │
//! │  ┌───▼─────┐   │   ┌──────▼───┐     │      ┌────────▼────────┐   │
//! │  │  Data   │   │   │ Metrics  │     │      │ ReportManager / │   │
//! │  │Collector│   │   │ Provider │     │      │  AlertManager   │   │
//! │  └─────────┘   │   └──────────┘     │      └─────────────────┘   │
//! │            ┌───▼────────────────────▼───┐                        │
//! │            │         Dispatcher         │──► NotificationChannel │
//! │            └────────────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Report Flow
//!
//! ```text
//! Scheduler tick
//!       │
//!       ▼
//! ┌───────────────┐
//! │ Due definitions│ ─── none ──► idle
//! └──────┬────────┘
//!        │ chunks of max_concurrent_reports
//!        ▼
//! ┌───────────────┐
//! │  DataSource   │ ─── error ──► FallbackSource (synthetic)
//! └──────┬────────┘
//!        ▼
//! ┌───────────────┐
//! │   Formatter   │ ─── error ──► ReportGenerationFailed
//! └──────┬────────┘
//!        ▼
//! ┌───────────────┐
//! │ ArtifactStore │
//! └──────┬────────┘
//!        ▼
//! ┌───────────────┐
//! │  Dispatcher   │
//! └──────┬────────┘
//!        ▼
//!  ReportGenerated, schedule advanced
//! ```

pub mod alerts;
pub mod config;
pub mod distribution;
pub mod events;
pub mod report;
pub mod retention;
pub mod runtime;
pub mod sources;
pub mod store;
pub mod types;
