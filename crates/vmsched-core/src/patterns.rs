//! Tag-value grammars and their supporting token grammars.
//!
//! Tag grammars are tried in priority order and the first match wins:
//!
//! 1. `<start?>To<stop?>|<weekdays>|<tz>` (e.g. `08To18|12345|IST`, `To18|12345|UTC`)
//! 2. `Na` on its own: every field disabled
//! 3. `Na|<weekdays>|<tz>`: start and stop disabled, weekday bookkeeping kept
//!
//! Keywords (`To`, `Na`) and timezone abbreviations are case-insensitive.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

/// Explicit "intentionally unset" marker, distinct from omission.
pub const SENTINEL: &str = "NA";

/// Rendering format of persisted UTC instants.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Three-letter abbreviations accepted in tags, mapped to IANA zones.
const TIMEZONE_ABBREVIATIONS: &[(&str, Tz)] = &[
    ("IST", chrono_tz::Asia::Kolkata),
    ("PST", chrono_tz::America::Los_Angeles),
    ("CST", chrono_tz::Asia::Shanghai),
    ("UTC", chrono_tz::UTC),
    ("GMT", chrono_tz::Etc::GMT),
    ("EST", chrono_tz::America::New_York),
    ("CET", chrono_tz::Europe::Paris),
    ("JST", chrono_tz::Asia::Tokyo),
];

pub fn is_sentinel(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(SENTINEL)
}

// ---------------------------------------------------------------------------
// Compiled grammars
// ---------------------------------------------------------------------------

static SCHEDULED_RE: OnceLock<Regex> = OnceLock::new();
static DISABLED_RE: OnceLock<Regex> = OnceLock::new();
static MANUAL_RE: OnceLock<Regex> = OnceLock::new();
static HOUR_RE: OnceLock<Regex> = OnceLock::new();
static WEEKDAYS_RE: OnceLock<Regex> = OnceLock::new();
static TZ_ABBR_RE: OnceLock<Regex> = OnceLock::new();
static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();

fn scheduled_re() -> &'static Regex {
    SCHEDULED_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<start>\d+)?To(?P<stop>\d+)?\|(?P<weekdays>\d+)\|(?P<timezone>[A-Za-z]+)$",
        )
        .unwrap()
    })
}

fn disabled_re() -> &'static Regex {
    DISABLED_RE.get_or_init(|| Regex::new(r"(?i)^Na$").unwrap())
}

fn manual_re() -> &'static Regex {
    MANUAL_RE.get_or_init(|| {
        Regex::new(r"(?i)^Na\|(?P<weekdays>\d+)\|(?P<timezone>[A-Za-z]+)$").unwrap()
    })
}

fn hour_re() -> &'static Regex {
    HOUR_RE.get_or_init(|| Regex::new(r"^(?P<hour>0[0-9]|1[0-9]|2[0-3])$").unwrap())
}

fn weekdays_re() -> &'static Regex {
    WEEKDAYS_RE.get_or_init(|| Regex::new(r"^[1-7]+$").unwrap())
}

fn tz_abbr_re() -> &'static Regex {
    TZ_ABBR_RE.get_or_init(|| Regex::new(r"^[A-Za-z]{3}$").unwrap())
}

fn timestamp_re() -> &'static Regex {
    TIMESTAMP_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap())
}

// ---------------------------------------------------------------------------
// TagGrammar / TagCaptures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagGrammar {
    /// `<start?>To<stop?>|<weekdays>|<tz>`
    Scheduled,
    /// `Na`
    Disabled,
    /// `Na|<weekdays>|<tz>`
    ManualOnly,
}

/// Raw field tokens captured by a tag grammar. `None` start/stop means the
/// operand was left empty around `To`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCaptures {
    pub grammar: TagGrammar,
    pub start: Option<String>,
    pub stop: Option<String>,
    pub weekdays: String,
    pub timezone: String,
}

// ---------------------------------------------------------------------------
// PatternCatalog
// ---------------------------------------------------------------------------

pub struct PatternCatalog;

impl PatternCatalog {
    /// Match a trimmed tag value against the grammars in priority order.
    pub fn match_tag(value: &str) -> Option<TagCaptures> {
        if let Some(caps) = scheduled_re().captures(value) {
            return Some(TagCaptures {
                grammar: TagGrammar::Scheduled,
                start: caps.name("start").map(|m| m.as_str().to_string()),
                stop: caps.name("stop").map(|m| m.as_str().to_string()),
                weekdays: caps["weekdays"].to_string(),
                timezone: caps["timezone"].to_string(),
            });
        }

        if disabled_re().is_match(value) {
            return Some(TagCaptures {
                grammar: TagGrammar::Disabled,
                start: Some(SENTINEL.to_string()),
                stop: Some(SENTINEL.to_string()),
                weekdays: SENTINEL.to_string(),
                timezone: SENTINEL.to_string(),
            });
        }

        manual_re().captures(value).map(|caps| TagCaptures {
            grammar: TagGrammar::ManualOnly,
            start: Some(SENTINEL.to_string()),
            stop: Some(SENTINEL.to_string()),
            weekdays: caps["weekdays"].to_string(),
            timezone: caps["timezone"].to_string(),
        })
    }

    /// Parse a two-digit hour token (`00`-`23`).
    pub fn hour(token: &str) -> Option<u32> {
        hour_re()
            .captures(token)
            .and_then(|caps| caps["hour"].parse().ok())
    }

    /// Parse a run of weekday digits, collapsing duplicates in first-seen order.
    pub fn weekday_digits(token: &str) -> Option<Vec<u8>> {
        if !weekdays_re().is_match(token) {
            return None;
        }
        let mut days: Vec<u8> = Vec::with_capacity(token.len());
        for b in token.bytes() {
            let day = b - b'0';
            if !days.contains(&day) {
                days.push(day);
            }
        }
        Some(days)
    }

    /// Resolve a three-letter abbreviation (any case) through the fixed table.
    pub fn timezone_abbreviation(token: &str) -> Option<Tz> {
        if !tz_abbr_re().is_match(token) {
            return None;
        }
        let upper = token.to_ascii_uppercase();
        TIMEZONE_ABBREVIATIONS
            .iter()
            .find(|(abbr, _)| *abbr == upper)
            .map(|(_, tz)| *tz)
    }

    /// Abbreviation first, then a full IANA name such as `Europe/Berlin`.
    pub fn timezone_name(token: &str) -> Option<Tz> {
        let token = token.trim();
        Self::timezone_abbreviation(token).or_else(|| token.parse::<Tz>().ok())
    }

    /// Parse a full `YYYY-MM-DDTHH:MM:SSZ` timestamp.
    pub fn timestamp(token: &str) -> Option<DateTime<Utc>> {
        if !timestamp_re().is_match(token) {
            return None;
        }
        NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
