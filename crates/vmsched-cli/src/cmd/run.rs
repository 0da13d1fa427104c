use crate::output::{cell, print_json, print_table};
use anyhow::Context;
use std::path::Path;
use vmsched_core::{
    config::SchedulerConfig,
    directory::InventoryDirectory,
    patterns::TIMESTAMP_FORMAT,
    processor::{Processor, RunStatus, RunSummary},
    store::RedbScheduleStore,
};

pub fn run(root: &Path, now: Option<&str>, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(root).context("failed to load config")?;
    let now = super::parse_now(now)?;
    let directory = InventoryDirectory::open(root).context("failed to open inventory")?;
    let store = RedbScheduleStore::open_in(root, &config.scheduler.table_name)
        .context("failed to open schedule store")?;

    let summary = Processor::new(&config, &directory, &store)
        .dry_run(dry_run)
        .run_pass(now);

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    if summary.status == RunStatus::Failure {
        anyhow::bail!("reconciliation pass finished with failures");
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("{}", summary.message);
    let Some(window) = summary.window else {
        return;
    };
    println!(
        "Window:    {} .. {}{}",
        window.past.format(TIMESTAMP_FORMAT),
        window.now.format(TIMESTAMP_FORMAT),
        if summary.dry_run { "  (dry run)" } else { "" }
    );

    if summary.instance_processed.instances.is_empty() {
        println!("No instances to process.");
    } else {
        let rows = summary
            .instance_processed
            .instances
            .iter()
            .map(|r| {
                vec![
                    r.instance_id.clone(),
                    r.name.clone(),
                    cell(r.outcome.map(|o| o.as_str())),
                    r.action.to_string(),
                    cell(r.reason.map(|reason| reason.as_str())),
                    cell(r.error.as_deref()),
                ]
            })
            .collect();
        print_table(&["ID", "NAME", "OUTCOME", "ACTION", "REASON", "ERROR"], rows);
    }

    println!(
        "Processed: {}  Started: {}  Stopped: {}  Status: {}  ({} ms)",
        summary.instance_processed.count,
        summary.instance_started.count,
        summary.instance_stopped.count,
        summary.status,
        summary.execution_time_ms
    );
}
