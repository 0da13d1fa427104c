pub mod config;
pub mod init;
pub mod parse;
pub mod record;
pub mod run;

use anyhow::Context;
use chrono::{DateTime, Utc};

/// `--now` as an RFC 3339 instant, or the current time.
pub fn parse_now(now: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match now {
        None => Ok(Utc::now()),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("invalid --now '{s}': expected RFC 3339, e.g. 2024-05-15T08:05:00Z")),
    }
}
