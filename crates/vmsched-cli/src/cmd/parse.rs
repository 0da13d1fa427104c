use crate::output::{cell, print_json};
use anyhow::Context;
use std::path::Path;
use vmsched_core::{
    codec::NormalizationCodec, config::SchedulerConfig, tag_parser::TagScheduleParser,
    types::LifecycleState,
};

pub fn run(
    root: &Path,
    tag: Option<&str>,
    now: Option<&str>,
    state: &str,
    name: &str,
    json: bool,
) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(root).context("failed to load config")?;
    let now = super::parse_now(now)?;
    let state: LifecycleState = state.parse()?;

    let parsed = TagScheduleParser::new(&config, now)
        .parse(name, state, tag)
        .context("failed to derive a schedule")?;

    if json {
        return print_json(&parsed);
    }

    let schedule = &parsed.schedule;
    println!("Tag:       {}", cell(parsed.tag_value.as_deref()));
    println!("Outcome:   {}", parsed.outcome);
    if parsed.outcome.uses_defaults() {
        println!("           (operator defaults applied)");
    }
    println!("Instance:  {} [{}]", schedule.resource_name(), schedule.lifecycle_state());
    println!(
        "Timezone:  {}",
        cell(schedule.timezone().map(|tz| tz.name()))
    );
    println!(
        "Weekdays:  {}",
        cell(schedule.weekdays().map(|d| d.to_digits()))
    );
    println!(
        "Start:     {}",
        cell(Some(NormalizationCodec::instant(schedule.start_time())))
    );
    println!(
        "Stop:      {}",
        cell(Some(NormalizationCodec::instant(schedule.stop_time())))
    );
    Ok(())
}
