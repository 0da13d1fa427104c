mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, record::RecordSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vmsched",
    about = "Tag-driven start/stop scheduling for compute instances",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .vmsched/)
    #[arg(long, global = true, env = "VMSCHED_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .vmsched/ with a default config, an empty inventory, and the schedule store
    Init,

    /// Derive the live schedule a tag value would produce
    Parse {
        /// Tag value (omit to parse as if the tag were absent)
        tag: Option<String>,

        /// Evaluation instant, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,

        /// Observed lifecycle state of the instance
        #[arg(long, default_value = "STOPPED")]
        state: String,

        /// Instance name shown in the derived schedule
        #[arg(long, default_value = "instance")]
        name: String,
    },

    /// Inspect and seed persisted schedule records
    Record {
        #[command(subcommand)]
        subcommand: RecordSubcommand,
    },

    /// Run one reconciliation pass over every persisted record
    Run {
        /// Evaluation instant, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,

        /// Decide without starting/stopping instances or writing records back
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or validate the scheduler configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Parse {
            tag,
            now,
            state,
            name,
        } => cmd::parse::run(&root, tag.as_deref(), now.as_deref(), &state, &name, cli.json),
        Commands::Record { subcommand } => cmd::record::run(&root, subcommand, cli.json),
        Commands::Run { now, dry_run } => cmd::run::run(&root, now.as_deref(), dry_run, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
