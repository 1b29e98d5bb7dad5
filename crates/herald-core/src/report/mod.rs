//! Scheduled report generation.
//!
//! - [`types`]: definitions, schedules, filters and artifacts
//! - [`schedule`]: next-fire-time calculation
//! - [`formatter`]: filtering and serialization of collected data
//! - [`manager`]: definition registry and artifact index
//! - [`scheduler`]: the tick-driven generation pipeline

pub mod formatter;
pub mod manager;
pub mod schedule;
pub mod scheduler;
pub mod types;

pub use formatter::{apply_filters, format_report, FormatError, ReportHeader, ReportPayload};
pub use manager::ReportManager;
pub use schedule::calculate_next_generation;
pub use scheduler::{GenerationError, ReportScheduler, SchedulerConfig, SchedulerTickSummary};
pub use types::{
    ArtifactQuery, Frequency, GeneratedReportArtifact, NumericFilter, OutputFormat,
    ReportDefinitionRequest,
    ReportFilters, ScheduleSpec, ScheduledReportDefinition,
};
