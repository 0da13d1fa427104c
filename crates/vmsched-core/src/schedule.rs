use crate::types::LifecycleState;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// WeekdaySet
// ---------------------------------------------------------------------------

/// Weekdays an instance is scheduled on, 1 = Monday through 7 = Sunday.
///
/// Keeps first-seen order so the set renders back to the digits it was read from.
/// Equality ignores that order.
#[derive(Debug, Clone, Default)]
pub struct WeekdaySet(Vec<u8>);

impl WeekdaySet {
    /// Build from day numbers, dropping out-of-range values and duplicates.
    pub fn from_days(days: impl IntoIterator<Item = u8>) -> Self {
        let mut out = Vec::new();
        for day in days {
            if (1..=7).contains(&day) && !out.contains(&day) {
                out.push(day);
            }
        }
        Self(out)
    }

    pub fn contains(&self, day: u8) -> bool {
        self.0.contains(&day)
    }

    pub fn days(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bit `n` set for each day `n`.
    fn mask(&self) -> u8 {
        self.0.iter().fold(0, |mask, day| mask | (1u8 << *day))
    }

    /// Concatenated digits with no separators, e.g. `12345`.
    pub fn to_digits(&self) -> String {
        self.0.iter().map(|d| char::from(b'0' + d)).collect()
    }
}

impl PartialEq for WeekdaySet {
    fn eq(&self, other: &Self) -> bool {
        self.mask() == other.mask()
    }
}

impl Eq for WeekdaySet {}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_digits())
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_digits())
    }
}

// ---------------------------------------------------------------------------
// ScheduleFields
// ---------------------------------------------------------------------------

/// The four schedule fields while they are still being resolved.
/// `None` means disabled for that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleFields {
    pub timezone: Option<Tz>,
    pub weekdays: Option<WeekdaySet>,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

impl ScheduleFields {
    pub fn disabled() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// ScheduleModel
// ---------------------------------------------------------------------------

/// One instance's start/stop schedule plus its observed lifecycle state.
/// Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleModel {
    resource_name: String,
    lifecycle_state: LifecycleState,
    #[serde(serialize_with = "serialize_tz")]
    timezone: Option<Tz>,
    weekdays: Option<WeekdaySet>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
}

impl ScheduleModel {
    pub fn new(
        resource_name: impl Into<String>,
        lifecycle_state: LifecycleState,
        fields: ScheduleFields,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            lifecycle_state,
            timezone: fields.timezone,
            weekdays: fields.weekdays,
            start_time: fields.start,
            stop_time: fields.stop,
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle_state
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    pub fn weekdays(&self) -> Option<&WeekdaySet> {
        self.weekdays.as_ref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        self.stop_time
    }

    /// Copy of the four schedule fields.
    pub fn fields(&self) -> ScheduleFields {
        ScheduleFields {
            timezone: self.timezone,
            weekdays: self.weekdays.clone(),
            start: self.start_time,
            stop: self.stop_time,
        }
    }
}

impl fmt::Display for ScheduleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
        }
        write!(
            f,
            "{} To {} | {} | {}",
            opt(self.start_time.map(|t| t.format(crate::patterns::TIMESTAMP_FORMAT))),
            opt(self.stop_time.map(|t| t.format(crate::patterns::TIMESTAMP_FORMAT))),
            opt(self.weekdays.as_ref()),
            opt(self.timezone.map(|tz| tz.name())),
        )
    }
}

fn serialize_tz<S: Serializer>(tz: &Option<Tz>, s: S) -> Result<S::Ok, S::Error> {
    match tz {
        Some(tz) => s.serialize_some(tz.name()),
        None => s.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
