use crate::types::TagParseOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("not initialized: run 'vmsched init'")]
    NotInitialized,

    #[error("malformed tag value '{value}': {reason}")]
    MalformedTagValue { value: String, reason: String },

    #[error("default schedule unavailable ({outcome}): {reason}")]
    UnresolvableDefault {
        outcome: TagParseOutcome,
        reason: String,
    },

    #[error("malformed persisted timestamp in {field}: '{value}'")]
    MalformedPersistedTimestamp { field: &'static str, value: String },

    #[error("malformed persisted {field}: '{value}'")]
    MalformedPersistedRecord { field: &'static str, value: String },

    #[error("start and stop resolve to the same instant: {0}")]
    InvalidTimeRange(String),

    #[error("invalid lifecycle state: {0}")]
    InvalidLifecycleState(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid hour '{0}': expected 00-23")]
    InvalidHour(String),

    #[error("invalid weekdays '{0}': expected digits 1-7")]
    InvalidWeekdays(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("resource directory error: {0}")]
    Directory(String),

    #[error("schedule store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedError>;
