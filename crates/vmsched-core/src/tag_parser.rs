//! Live schedule derivation from the schedule tag.
//!
//! Absence and emptiness of the tag fall back to the operator defaults, as does
//! a value that fails any grammar or field check. An explicit `NA` in a tag
//! field disables that field and is never replaced by a default: a tag that
//! disables the whole schedule opts the instance out of automation.

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedError};
use crate::patterns::{is_sentinel, PatternCatalog, TagCaptures};
use crate::schedule::{ScheduleFields, ScheduleModel, WeekdaySet};
use crate::types::{LifecycleState, TagParseOutcome};
use chrono::{DateTime, Duration, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// TagParse (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TagParse {
    /// Trimmed tag value as read from the instance, if the tag exists.
    pub tag_value: Option<String>,
    pub outcome: TagParseOutcome,
    pub schedule: ScheduleModel,
}

/// Tag fields after validation, before the automation checks.
enum Resolved {
    Automated(ScheduleFields),
    NoAutomation(ScheduleFields),
}

// ---------------------------------------------------------------------------
// TagScheduleParser
// ---------------------------------------------------------------------------

pub struct TagScheduleParser<'a> {
    config: &'a SchedulerConfig,
    now: DateTime<Utc>,
}

impl<'a> TagScheduleParser<'a> {
    /// `now` anchors hour tokens to a calendar day in the schedule's timezone.
    pub fn new(config: &'a SchedulerConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    /// Derive the live schedule for one instance.
    ///
    /// Only fails when the operator defaults are needed and cannot produce a
    /// schedule; every tag-level problem is recovered by falling back.
    pub fn parse(
        &self,
        resource_name: &str,
        lifecycle_state: LifecycleState,
        tag: Option<&str>,
    ) -> Result<TagParse> {
        let tag_value = tag.map(|t| t.trim().to_string());

        let (outcome, fields) = match tag_value.as_deref() {
            None => {
                info!(resource = %resource_name, "schedule tag is not present, applying defaults");
                (TagParseOutcome::TagUndefined, None)
            }
            Some("") => {
                info!(resource = %resource_name, "schedule tag has no value, applying defaults");
                (TagParseOutcome::TagDefinedWithNoValue, None)
            }
            Some(value) => match self.resolve_tag(value) {
                Ok(Resolved::Automated(fields)) => {
                    (TagParseOutcome::TagDefinedWithValidValue, Some(fields))
                }
                Ok(Resolved::NoAutomation(fields)) => {
                    info!(resource = %resource_name, tag = %value, "schedule tag opts out of automation");
                    (TagParseOutcome::TagDefinedWithNoAutomation, Some(fields))
                }
                Err(e) => {
                    info!(resource = %resource_name, error = %e, "schedule tag rejected, applying defaults");
                    (TagParseOutcome::TagDefinedWithInvalidValue, None)
                }
            },
        };

        let fields = match fields {
            Some(fields) => fields,
            None => self
                .default_fields()
                .map_err(|e| SchedError::UnresolvableDefault {
                    outcome,
                    reason: e.to_string(),
                })?,
        };

        let schedule = ScheduleModel::new(
            resource_name,
            lifecycle_state,
            self.apply_auto_start(fields),
        );
        info!(resource = %resource_name, outcome = %outcome, schedule = %schedule, "live schedule derived");

        Ok(TagParse {
            tag_value,
            outcome,
            schedule,
        })
    }

    /// Build the operator fallback schedule.
    ///
    /// Requires a timezone, a weekday set, and at least one of start/stop.
    pub fn default_fields(&self) -> Result<ScheduleFields> {
        let defaults = &self.config.defaults;

        let timezone = defaults
            .timezone()?
            .ok_or_else(|| SchedError::InvalidConfig("default timezone is not set".to_string()))?;
        let weekdays = defaults
            .weekdays()?
            .ok_or_else(|| SchedError::InvalidConfig("default weekdays are not set".to_string()))?;

        let start = defaults
            .start_hour()?
            .map(|h| self.resolve_hour(timezone, h, "default start"))
            .transpose()?;
        let stop = defaults
            .stop_hour()?
            .map(|h| self.resolve_hour(timezone, h, "default stop"))
            .transpose()?;

        if start.is_none() && stop.is_none() {
            return Err(SchedError::InvalidConfig(
                "default start and stop are both unset".to_string(),
            ));
        }
        if start.is_some() && start == stop {
            return Err(SchedError::InvalidTimeRange(
                "default start equals default stop".to_string(),
            ));
        }

        Ok(ScheduleFields {
            timezone: Some(timezone),
            weekdays: Some(weekdays),
            start,
            stop,
        })
    }

    fn apply_auto_start(&self, mut fields: ScheduleFields) -> ScheduleFields {
        if !self.config.scheduler.activate_auto_start && fields.start.is_some() {
            info!("auto start is deactivated, discarding start time");
            fields.start = None;
        }
        fields
    }

    fn resolve_tag(&self, value: &str) -> Result<Resolved> {
        let caps = PatternCatalog::match_tag(value).ok_or_else(|| SchedError::MalformedTagValue {
            value: value.to_string(),
            reason: "matches no schedule grammar".to_string(),
        })?;
        let fields = self.resolve_captures(value, &caps)?;

        if fields.timezone.is_none() && fields.weekdays.is_none() {
            return Ok(Resolved::NoAutomation(fields));
        }
        if fields.start.is_none() && fields.stop.is_none() {
            return Ok(Resolved::NoAutomation(fields));
        }
        if fields.start == fields.stop {
            return Err(SchedError::InvalidTimeRange(value.to_string()));
        }
        Ok(Resolved::Automated(fields))
    }

    fn resolve_captures(&self, value: &str, caps: &TagCaptures) -> Result<ScheduleFields> {
        let malformed = |reason: String| SchedError::MalformedTagValue {
            value: value.to_string(),
            reason,
        };

        let timezone = if is_sentinel(&caps.timezone) {
            None
        } else {
            let tz = PatternCatalog::timezone_abbreviation(&caps.timezone)
                .ok_or_else(|| malformed(format!("unknown timezone '{}'", caps.timezone)))?;
            Some(tz)
        };

        let weekdays = if is_sentinel(&caps.weekdays) {
            None
        } else {
            let days = PatternCatalog::weekday_digits(&caps.weekdays)
                .ok_or_else(|| malformed(format!("invalid weekdays '{}'", caps.weekdays)))?;
            Some(WeekdaySet::from_days(days))
        };

        let start = self.resolve_hour_token(caps.start.as_deref(), timezone, "start", &malformed)?;
        let stop = self.resolve_hour_token(caps.stop.as_deref(), timezone, "stop", &malformed)?;

        Ok(ScheduleFields {
            timezone,
            weekdays,
            start,
            stop,
        })
    }

    /// Empty operand and `NA` disable the edge. A well-formed hour without a
    /// timezone cannot be anchored and is disabled too.
    fn resolve_hour_token(
        &self,
        token: Option<&str>,
        timezone: Option<Tz>,
        edge: &str,
        malformed: &dyn Fn(String) -> SchedError,
    ) -> Result<Option<DateTime<Utc>>> {
        let token = match token {
            None => return Ok(None),
            Some(t) if is_sentinel(t) => return Ok(None),
            Some(t) => t,
        };
        let hour = PatternCatalog::hour(token)
            .ok_or_else(|| malformed(format!("invalid {edge} hour '{token}'")))?;
        match timezone {
            None => Ok(None),
            Some(tz) => self.resolve_hour(tz, hour, edge).map(Some),
        }
    }

    fn resolve_hour(&self, tz: Tz, hour: u32, edge: &str) -> Result<DateTime<Utc>> {
        utc_from_local_hour(tz, hour, self.now)
            .ok_or_else(|| SchedError::InvalidHour(format!("{edge} {hour:02} in {}", tz.name())))
    }
}

/// UTC instant of `hour:00` local time in `tz`, on the local calendar day of `now`.
///
/// Ambiguous local times take the earlier instant. A local time skipped by a
/// DST transition moves forward one hour.
pub fn utc_from_local_hour(tz: Tz, hour: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let naive = now
        .with_timezone(&tz)
        .date_naive()
        .and_hms_opt(hour, 0, 0)?;
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest(),
    }?;
    Some(local.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
