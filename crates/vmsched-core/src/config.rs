use crate::error::{Result, SchedError};
use crate::patterns::{is_sentinel, PatternCatalog};
use crate::paths;
use crate::schedule::WeekdaySet;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SchedulerSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Kill switch for the whole control loop.
    #[serde(default = "default_true")]
    pub activate_auto_start_stop: bool,
    /// When off, start times are discarded and only stops are automated.
    #[serde(default = "default_true")]
    pub activate_auto_start: bool,
    /// Length of the evaluation window in minutes.
    #[serde(default = "default_minutes_delta")]
    pub minutes_delta: u32,
    #[serde(default = "default_tag_key")]
    pub schedule_tag_key: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

fn default_true() -> bool {
    true
}

fn default_minutes_delta() -> u32 {
    10
}

fn default_tag_key() -> String {
    "Schedule".to_string()
}

fn default_table_name() -> String {
    "instance_schedules".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            activate_auto_start_stop: default_true(),
            activate_auto_start: default_true(),
            minutes_delta: default_minutes_delta(),
            schedule_tag_key: default_tag_key(),
            table_name: default_table_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleDefaults
// ---------------------------------------------------------------------------

/// Operator fallback schedule. Each field is unset, the `NA` sentinel, or a value.
/// Unset and `NA` both resolve to "disabled" for that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
}

/// `None` for unset, empty, or sentinel values.
fn configured(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !is_sentinel(v))
}

impl ScheduleDefaults {
    pub fn timezone(&self) -> Result<Option<Tz>> {
        match configured(&self.timezone) {
            None => Ok(None),
            Some(v) => PatternCatalog::timezone_name(v)
                .map(Some)
                .ok_or_else(|| SchedError::UnknownTimezone(v.to_string())),
        }
    }

    pub fn weekdays(&self) -> Result<Option<WeekdaySet>> {
        match configured(&self.weekdays) {
            None => Ok(None),
            Some(v) => PatternCatalog::weekday_digits(v)
                .map(|days| Some(WeekdaySet::from_days(days)))
                .ok_or_else(|| SchedError::InvalidWeekdays(v.to_string())),
        }
    }

    pub fn start_hour(&self) -> Result<Option<u32>> {
        hour(&self.start)
    }

    pub fn stop_hour(&self) -> Result<Option<u32>> {
        hour(&self.stop)
    }
}

/// Operator hours are plain integers, so `8` and `08` are both accepted.
/// Tag hours stay on the strict two-digit grammar.
fn hour(value: &Option<String>) -> Result<Option<u32>> {
    match configured(value) {
        None => Ok(None),
        Some(v) => {
            let digits = v.len() <= 2 && v.bytes().all(|b| b.is_ascii_digit());
            digits
                .then(|| v.parse::<u32>().ok())
                .flatten()
                .filter(|h| *h <= 23)
                .map(Some)
                .ok_or_else(|| SchedError::InvalidHour(v.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub defaults: ScheduleDefaults,
}

fn default_version() -> u32 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            scheduler: SchedulerSettings::default(),
            defaults: ScheduleDefaults::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SchedError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: SchedulerConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Build from flat function-style key/value configuration, e.g.
    /// `DefaultTimezone=IST`, `ActivateAutoStart=True`, `MinutesDelta=10`.
    /// Missing keys keep their defaults.
    pub fn from_function_config(values: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| values.get(key).map(|v| v.trim().to_string());
        let flag = |key: &str, fallback: bool| {
            get(key)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(fallback)
        };

        let mut cfg = SchedulerConfig::default();
        cfg.scheduler.activate_auto_start_stop = flag("ActivateAutoStartStopProcess", true);
        cfg.scheduler.activate_auto_start = flag("ActivateAutoStart", true);
        if let Some(delta) = get("MinutesDelta") {
            cfg.scheduler.minutes_delta = delta.parse().map_err(|_| {
                SchedError::InvalidConfig(format!("MinutesDelta must be a whole number, got '{delta}'"))
            })?;
        }
        if let Some(key) = get("ScheduleTagKey") {
            cfg.scheduler.schedule_tag_key = key;
        }
        if let Some(table) = get("TableName") {
            cfg.scheduler.table_name = table;
        }
        cfg.defaults = ScheduleDefaults {
            timezone: get("DefaultTimezone"),
            weekdays: get("DefaultWeekdays"),
            start: get("DefaultStart"),
            stop: get("DefaultStop"),
        };
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        // 1. Field-level parse failures in the default schedule
        let timezone = self.defaults.timezone().unwrap_or_else(|e| {
            warnings.push(error(format!("defaults.timezone: {e}")));
            None
        });
        let weekdays = self.defaults.weekdays().unwrap_or_else(|e| {
            warnings.push(error(format!("defaults.weekdays: {e}")));
            None
        });
        let start = self.defaults.start_hour().unwrap_or_else(|e| {
            warnings.push(error(format!("defaults.start: {e}")));
            None
        });
        let stop = self.defaults.stop_hour().unwrap_or_else(|e| {
            warnings.push(error(format!("defaults.stop: {e}")));
            None
        });

        // 2. A default schedule that can never be built
        if timezone.is_none() || weekdays.is_none() || (start.is_none() && stop.is_none()) {
            warnings.push(warning(
                "default schedule is incomplete: untagged or mis-tagged instances will not be automated"
                    .to_string(),
            ));
        }

        // 3. Equal default hours cannot be recovered from
        if let (Some(start), Some(stop)) = (start, stop) {
            if start == stop {
                warnings.push(error(format!(
                    "defaults.start and defaults.stop are both {start:02}: fallback schedules will be rejected"
                )));
            }
        }

        if self.scheduler.minutes_delta == 0 {
            warnings.push(error(
                "scheduler.minutes_delta is 0: no start or stop can ever fall inside the window"
                    .to_string(),
            ));
        } else if self.scheduler.minutes_delta > 24 * 60 {
            warnings.push(warning(format!(
                "scheduler.minutes_delta={} spans more than a day",
                self.scheduler.minutes_delta
            )));
        }

        if self.scheduler.schedule_tag_key.trim().is_empty() {
            warnings.push(error("scheduler.schedule_tag_key is empty".to_string()));
        }

        if self.scheduler.table_name.trim().is_empty() {
            warnings.push(error("scheduler.table_name is empty".to_string()));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
