use crate::error::{Result, SchedError};
use crate::patterns::PatternCatalog;
use crate::schedule::{ScheduleFields, ScheduleModel, WeekdaySet};
use crate::types::LifecycleState;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PersistedRecord
// ---------------------------------------------------------------------------

/// One row of the schedule table: the last schedule written for an instance.
///
/// Start and stop are `YYYY-MM-DDTHH:MM:SSZ` or the empty string for "absent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub instance_id: String,
    pub instance_name: String,
    pub lifecycle_state: String,
    #[serde(default)]
    pub working_timezone: String,
    #[serde(default)]
    pub working_days: String,
    #[serde(default)]
    pub utc_start_time: String,
    #[serde(default)]
    pub utc_stop_time: String,
}

// ---------------------------------------------------------------------------
// PersistedScheduleBuilder
// ---------------------------------------------------------------------------

pub struct PersistedScheduleBuilder;

impl PersistedScheduleBuilder {
    /// Build the persisted schedule for one record.
    ///
    /// A timestamp that is neither empty nor a full UTC timestamp rejects the
    /// whole record, as does an unknown lifecycle state, timezone or weekday.
    pub fn build(record: &PersistedRecord) -> Result<ScheduleModel> {
        let lifecycle_state: LifecycleState =
            record.lifecycle_state.parse().map_err(|_| SchedError::MalformedPersistedRecord {
                field: "lifecycle_state",
                value: record.lifecycle_state.clone(),
            })?;

        let fields = ScheduleFields {
            timezone: Self::timezone(&record.working_timezone)?,
            weekdays: Some(Self::weekdays(&record.working_days)?),
            start: Self::timestamp("utc_start_time", &record.utc_start_time)?,
            stop: Self::timestamp("utc_stop_time", &record.utc_stop_time)?,
        };

        Ok(ScheduleModel::new(
            record.instance_name.clone(),
            lifecycle_state,
            fields,
        ))
    }

    fn timezone(value: &str) -> Result<Option<Tz>> {
        if value.is_empty() {
            return Ok(None);
        }
        PatternCatalog::timezone_name(value)
            .map(Some)
            .ok_or_else(|| SchedError::MalformedPersistedRecord {
                field: "working_timezone",
                value: value.to_string(),
            })
    }

    /// Each character is one weekday digit. No sentinel handling.
    fn weekdays(value: &str) -> Result<WeekdaySet> {
        if value.is_empty() {
            return Ok(WeekdaySet::default());
        }
        PatternCatalog::weekday_digits(value)
            .map(WeekdaySet::from_days)
            .ok_or_else(|| SchedError::MalformedPersistedRecord {
                field: "working_days",
                value: value.to_string(),
            })
    }

    fn timestamp(field: &'static str, value: &str) -> Result<Option<DateTime<Utc>>> {
        if value.is_empty() {
            return Ok(None);
        }
        PatternCatalog::timestamp(value)
            .map(Some)
            .ok_or_else(|| SchedError::MalformedPersistedTimestamp {
                field,
                value: value.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
