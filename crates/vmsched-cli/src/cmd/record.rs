use crate::output::{cell, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use vmsched_core::{
    config::SchedulerConfig,
    persisted::{PersistedRecord, PersistedScheduleBuilder},
    store::{RedbScheduleStore, ScheduleStore},
};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// List every persisted schedule record
    List,

    /// Show one record and the schedule it builds
    Show {
        /// Instance id
        id: String,
    },

    /// Upsert records from a YAML or JSON list
    Import {
        /// Path to the file
        file: std::path::PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: RecordSubcommand, json: bool) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(root).context("failed to load config")?;
    let store = RedbScheduleStore::open_in(root, &config.scheduler.table_name)
        .context("failed to open schedule store")?;

    match subcmd {
        RecordSubcommand::List => list(&store, json),
        RecordSubcommand::Show { id } => show(&store, &id, json),
        RecordSubcommand::Import { file } => import(&store, &file, json),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(store: &dyn ScheduleStore, json: bool) -> anyhow::Result<()> {
    let records = store.load_all()?;

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No schedule records.");
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.instance_id.clone(),
                r.instance_name.clone(),
                r.lifecycle_state.clone(),
                cell(Some(&r.working_timezone)),
                cell(Some(&r.working_days)),
                cell(Some(&r.utc_start_time)),
                cell(Some(&r.utc_stop_time)),
            ]
        })
        .collect();
    print_table(
        &["ID", "NAME", "STATE", "TIMEZONE", "DAYS", "START", "STOP"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(store: &dyn ScheduleStore, id: &str, json: bool) -> anyhow::Result<()> {
    let record = store
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("no schedule record for '{id}'"))?;
    let schedule = PersistedScheduleBuilder::build(&record);

    if json {
        let value = serde_json::json!({
            "record": record,
            "schedule": schedule.as_ref().ok(),
            "error": schedule.as_ref().err().map(|e| e.to_string()),
        });
        return print_json(&value);
    }

    println!("Instance:  {} ({})", record.instance_name, record.instance_id);
    println!("State:     {}", record.lifecycle_state);
    println!("Timezone:  {}", cell(Some(&record.working_timezone)));
    println!("Weekdays:  {}", cell(Some(&record.working_days)));
    println!("Start:     {}", cell(Some(&record.utc_start_time)));
    println!("Stop:      {}", cell(Some(&record.utc_stop_time)));
    match schedule {
        Ok(s) => println!("Schedule:  {s}"),
        Err(e) => println!("Schedule:  invalid ({e})"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

fn import(store: &dyn ScheduleStore, file: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    // JSON is a YAML subset, so one parser covers both
    let records: Vec<PersistedRecord> = serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    for record in &records {
        PersistedScheduleBuilder::build(record)
            .with_context(|| format!("record '{}' is invalid", record.instance_id))?;
    }
    for record in &records {
        store
            .upsert(record)
            .with_context(|| format!("failed to store '{}'", record.instance_id))?;
    }

    if json {
        return print_json(&serde_json::json!({ "imported": records.len() }));
    }
    println!("Imported {} record(s).", records.len());
    Ok(())
}
