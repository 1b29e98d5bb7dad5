//! Error types shared by the host-facing command surface.
//!
//! Definition and rule commands validate their input synchronously. A rejected command never
//! falls back to a default: the caller gets a [`ValidationError`] describing the missing or
//! malformed field.

use thiserror::Error;

/// Input rejected at definition or rule creation/update time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{entity} name is required")]
    MissingName { entity: &'static str },

    #[error("schedule frequency is required")]
    MissingFrequency,

    #[error("data source name is required")]
    MissingDataSource,

    #[error("invalid schedule time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("day_of_week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDayOfWeek(u8),

    #[error("day_of_month must be between 1 and 31, got {0}")]
    InvalidDayOfMonth(u32),

    #[error("condition type is required")]
    MissingConditionType,

    #[error("threshold value is required")]
    MissingThresholdValue,

    #[error("threshold value must be a finite number")]
    NonFiniteThreshold,

    #[error("condition type '{0}' is not a known type and no metric path was given")]
    MissingConditionPath(String),

    #[error("numeric filter on '{field}' has min greater than max")]
    InvertedRange { field: String },
}

/// Failure of a host command against the registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("alert '{id}' is already resolved")]
    AlreadyResolved { id: String },

    #[error("artifact storage failed: {0}")]
    Storage(String),
}

impl CommandError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}
