use crate::patterns::TIMESTAMP_FORMAT;
use crate::persisted::PersistedRecord;
use crate::schedule::ScheduleModel;
use chrono::{DateTime, Utc};

/// Renders a schedule back into the persisted record's textual columns.
pub struct NormalizationCodec;

impl NormalizationCodec {
    pub fn encode(instance_id: &str, schedule: &ScheduleModel) -> PersistedRecord {
        PersistedRecord {
            instance_id: instance_id.to_string(),
            instance_name: schedule.resource_name().to_string(),
            lifecycle_state: schedule.lifecycle_state().as_str().to_string(),
            working_timezone: schedule
                .timezone()
                .map(|tz| tz.name().to_string())
                .unwrap_or_default(),
            working_days: schedule
                .weekdays()
                .map(|days| days.to_digits())
                .unwrap_or_default(),
            utc_start_time: Self::instant(schedule.start_time()),
            utc_stop_time: Self::instant(schedule.stop_time()),
        }
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`, or empty when absent.
    pub fn instant(value: Option<DateTime<Utc>>) -> String {
        value
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default()
    }
}
