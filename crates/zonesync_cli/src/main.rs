//! zonesync CLI
//!
//! Command-line tools for inspecting and repairing the on-disk state of a
//! sync engine. The engine must not be running: the state directory lock is
//! taken for the duration of a command.
//!
//! # Commands
//!
//! - `inspect` - Display the change token, zone flag, subscriptions and queue
//! - `pending` - List or clear deletions queued while offline
//! - `reset` - Forget the change token, zone flag or subscription registry

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zonesync_engine::default_state_dir;

/// zonesync state tools.
#[derive(Parser)]
#[command(name = "zonesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the engine state directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Container identifier, used to locate the default state directory
    #[arg(global = true, short, long)]
    container: Option<String>,

    /// Zone name
    #[arg(global = true, short, long)]
    zone: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display persisted sync state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage deletions queued while offline
    Pending {
        #[command(subcommand)]
        action: PendingAction,
    },

    /// Forget persisted sync state so the next pass rebuilds it
    Reset {
        /// Clear the change token (next fetch is a full resync)
        #[arg(long)]
        token: bool,

        /// Clear the zone created flag
        #[arg(long)]
        zone_flag: bool,

        /// Clear the subscription registry
        #[arg(long)]
        subscriptions: bool,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum PendingAction {
    /// List queued deletions
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Drop every queued deletion
    Clear,
}

impl Cli {
    fn state_path(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        match (&self.path, &self.container) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(container)) => Ok(default_state_dir(container)),
            (None, None) => Err("State path or container identifier required".into()),
        }
    }

    fn zone_name(&self, command: &str) -> Result<String, Box<dyn std::error::Error>> {
        self.zone
            .clone()
            .ok_or_else(|| format!("Zone name required for {command}").into())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Inspect { format } => {
            let path = cli.state_path()?;
            let zone = cli.zone_name("inspect")?;
            commands::inspect::run(&path, &zone, format)?;
        }
        Commands::Pending { action } => {
            let path = cli.state_path()?;
            match action {
                PendingAction::List { format } => commands::pending::list(&path, format)?,
                PendingAction::Clear => commands::pending::clear(&path)?,
            }
        }
        Commands::Reset {
            token,
            zone_flag,
            subscriptions,
        } => {
            let path = cli.state_path()?;
            let zone = cli.zone_name("reset")?;
            // No flag resets everything
            let all = !token && !zone_flag && !subscriptions;
            let scope = commands::reset::ResetScope {
                token: *token || all,
                zone_flag: *zone_flag || all,
                subscriptions: *subscriptions || all,
            };
            commands::reset::run(&path, &zone, scope)?;
        }
        Commands::Version => {
            println!("zonesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
