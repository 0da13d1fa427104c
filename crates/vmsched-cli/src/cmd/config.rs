use crate::output::{cell, print_json};
use anyhow::Context;
use clap::Subcommand;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use vmsched_core::config::{ConfigWarning, SchedulerConfig, WarnLevel};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Replace the config from a flat key/value map (DefaultTimezone, MinutesDelta, ...)
    Import {
        /// YAML or JSON mapping of operator keys to values
        file: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Import { file } => import(root, &file, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(root).context("failed to load config")?;

    if json {
        return print_json(&config);
    }

    let s = &config.scheduler;
    let d = &config.defaults;
    println!("Automation:        {}", on_off(s.activate_auto_start_stop));
    println!("Auto start:        {}", on_off(s.activate_auto_start));
    println!("Window:            {} min", s.minutes_delta);
    println!("Schedule tag key:  {}", s.schedule_tag_key);
    println!("Table:             {}", s.table_name);
    println!("Defaults:");
    println!("  timezone:        {}", cell(d.timezone.as_deref()));
    println!("  weekdays:        {}", cell(d.weekdays.as_deref()));
    println!("  start:           {}", cell(d.start.as_deref()));
    println!("  stop:            {}", cell(d.stop.as_deref()));
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        print_warnings(&warnings);
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}

fn print_warnings(warnings: &[ConfigWarning]) {
    for w in warnings {
        let prefix = match w.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        println!("[{prefix}] {}", w.message);
    }
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

fn import(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    // Existing config proves the root is initialized
    SchedulerConfig::load(root).context("failed to load config")?;

    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let raw: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    let mut values = HashMap::new();
    for (key, value) in raw {
        let text = match value {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => anyhow::bail!("{key}: expected a scalar value"),
        };
        values.insert(key, text);
    }

    let config = SchedulerConfig::from_function_config(&values)?;
    let warnings = config.validate();
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        print_warnings(&warnings);
        anyhow::bail!("imported config has errors; nothing was written");
    }
    config.save(root).context("failed to write config")?;

    if json {
        let value = serde_json::json!({
            "config": config,
            "warnings": warnings,
        });
        return print_json(&value);
    }
    println!("Imported config from {}.", file.display());
    print_warnings(&warnings);
    Ok(())
}
