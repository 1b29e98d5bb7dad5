//! Report definition and artifact types.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{store::Record, types::ValidationError};

/// Output format of a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON. Authoritative serialization; other formats derive from it.
    Json,
    /// Tabular comma-separated values.
    Csv,
    /// Plain text with a title header.
    Text,
    /// Binary document with a title page wrapping the JSON body.
    Document,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Text => "text",
            Self::Document => "document",
        }
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Text => "text/plain",
            Self::Document => "application/octet-stream",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Json
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "text" => Ok(Self::Text),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// How often a report is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// Any other value. Scheduled 24 hours ahead.
    #[serde(other)]
    Unknown,
}

/// Default time of day for daily, weekly and monthly schedules.
pub const DEFAULT_SCHEDULE_TIME: &str = "09:00";

/// When a report fires.
///
/// `time` is `HH:MM` in UTC. `day_of_week` counts from 0 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleSpec {
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<u8>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
}

impl ScheduleSpec {
    #[must_use]
    pub fn new(frequency: Frequency) -> Self {
        Self { frequency: Some(frequency), ..Default::default() }
    }

    #[must_use]
    pub fn at(mut self, time: &str) -> Self {
        self.time = Some(time.to_string());
        self
    }

    #[must_use]
    pub fn on_weekday(mut self, day_of_week: u8) -> Self {
        self.day_of_week = Some(day_of_week);
        self
    }

    #[must_use]
    pub fn on_day(mut self, day_of_month: u32) -> Self {
        self.day_of_month = Some(day_of_month);
        self
    }

    /// Parses `time`, falling back to [`DEFAULT_SCHEDULE_TIME`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTime`] if `time` is set but not `HH:MM`.
    pub fn time_of_day(&self) -> Result<NaiveTime, ValidationError> {
        let raw = self.time.as_deref().unwrap_or(DEFAULT_SCHEDULE_TIME);
        NaiveTime::parse_from_str(raw, "%H:%M")
            .map_err(|_| ValidationError::InvalidTime(raw.to_string()))
    }

    /// # Errors
    ///
    /// Returns the first problem found with the schedule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.frequency.is_none() {
            return Err(ValidationError::MissingFrequency);
        }
        self.time_of_day()?;
        if let Some(day) = self.day_of_week {
            if day > 6 {
                return Err(ValidationError::InvalidDayOfWeek(day));
            }
        }
        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(ValidationError::InvalidDayOfMonth(day));
            }
        }
        Ok(())
    }
}

/// Inclusive min/max bound on a named numeric field of each time-series entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFilter {
    pub field: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Filters applied to collected data before formatting.
///
/// `parameters` are opaque to the engine and forwarded to the data source adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub numeric: Vec<NumericFilter>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl ReportFilters {
    fn validate(&self) -> Result<(), ValidationError> {
        for filter in &self.numeric {
            if let (Some(min), Some(max)) = (filter.min, filter.max) {
                if min > max {
                    return Err(ValidationError::InvertedRange { field: filter.field.clone() });
                }
            }
        }
        Ok(())
    }
}

/// A scheduled report's configuration plus its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReportDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub format: OutputFormat,
    pub schedule: ScheduleSpec,
    pub data_source: String,
    pub filters: ReportFilters,
    pub recipients: Vec<String>,
    pub distribution_methods: Vec<String>,
    pub is_active: bool,
    /// Always strictly after the instant it was computed at.
    pub next_fire_time: DateTime<Utc>,
    pub last_generated_time: Option<DateTime<Utc>>,
    /// Successful generations.
    pub generation_count: u64,
    /// Failed generation attempts.
    pub failure_count: u64,
    /// Error from the most recent attempt, cleared on success.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for ScheduledReportDefinition {
    fn id(&self) -> &str {
        &self.id
    }
}

fn default_true() -> bool {
    true
}

/// Host command payload for creating or updating a report definition.
///
/// Optional fields that the engine requires are checked by [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportDefinitionRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub schedule: ScheduleSpec,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub distribution_methods: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ReportDefinitionRequest {
    #[must_use]
    pub fn new(name: &str, data_source: &str, schedule: ScheduleSpec) -> Self {
        Self {
            name: Some(name.to_string()),
            data_source: Some(data_source.to_string()),
            schedule,
            is_active: true,
            ..Default::default()
        }
    }

    /// # Errors
    ///
    /// Returns the first missing or malformed field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(ValidationError::MissingName { entity: "report definition" });
        }
        self.schedule.validate()?;
        if self.data_source.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(ValidationError::MissingDataSource);
        }
        self.filters.validate()
    }
}

/// One generated report output plus its metadata. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReportArtifact {
    pub id: String,
    pub definition_id: String,
    pub format: OutputFormat,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub data_point_count: usize,
    pub size_bytes: usize,
    /// Opaque handle into the [`ArtifactStore`](crate::store::ArtifactStore).
    pub storage_key: String,
    /// Data came from the fallback adapter rather than the named source.
    pub synthetic: bool,
}

impl Record for GeneratedReportArtifact {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Storage key for the artifact a definition produced at `generated_at`.
#[must_use]
pub fn storage_key(definition_id: &str, generated_at: DateTime<Utc>) -> String {
    format!("{definition_id}_{}", generated_at.timestamp_millis())
}

/// Filters for listing generated artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactQuery {
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub definition_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}
