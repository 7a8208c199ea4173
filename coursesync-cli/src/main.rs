//! coursesync: publish a course content tree to Canvas.
//!
//! # Usage
//!
//! ```text
//! coursesync init [PATH] --course-id <ID>
//! coursesync sync [PATH] [--course-id <ID>] [--sync-calendar] [--no-prune] [--no-render]
//! coursesync status [PATH] [--json]
//! coursesync map list [PATH] [--json]
//! coursesync map forget <REL_PATH> [--root PATH]
//! coursesync map prune-missing [PATH]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, map::MapCommand, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "coursesync",
    version,
    about = "Sync a directory of course content to a Canvas course",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record the Canvas course id for a content root.
    Init(InitArgs),

    /// Render changed files and reconcile them with the course.
    Sync(SyncArgs),

    /// Show which files the next sync would touch (offline).
    Status(StatusArgs),

    /// Inspect or edit the local identity map.
    Map {
        #[command(subcommand)]
        command: MapCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Map { command } => commands::map::run(command),
    }
}
