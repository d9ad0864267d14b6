//! flrp-relay: shows what FL Studio is doing as Discord Rich Presence.
//!
//! ## Subcommands
//!
//! - `run` (default): Poll FL Studio and keep Discord in sync until `quit` or Ctrl-C
//! - `check-config`: Print the resolved configuration as JSON
//! - `probe`: Report whether FL Studio is running
//! - `status`: Read the status file once and print the activity it maps to

mod console;
mod logging;
mod signal;

use clap::{Parser, Subcommand};
use flrp_core::{
    build_activity, load_config, platform_endpoints, read_status_file, ActivitySnapshot,
    IpcConnector, JsonStatusFile, OperatorControls, PresenceSync, RelayConfig, SysinfoProbe,
};
use flrp_presence_protocol::ActivityPayload;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(name = "flrp-relay")]
#[command(about = "FL Studio Discord Rich Presence relay")]
#[command(version)]
struct Cli {
    /// Configuration file (.env or .json). Defaults to ./.env or the project root's .env
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default)
    Run,

    /// Print the resolved configuration
    CheckConfig,

    /// Report whether FL Studio is running
    Probe,

    /// Read the status file once and print the derived activity
    Status,
}

#[derive(Serialize)]
struct StatusReport {
    snapshot: ActivitySnapshot,
    activity: ActivityPayload,
}

fn main() {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cli.config.as_deref(), cli.debug),
        Commands::CheckConfig => {
            logging::init_console(cli.debug);
            let config = load_or_exit(cli.config.as_deref());
            print_json(&config);
        }
        Commands::Probe => {
            logging::init_console(cli.debug);
            probe();
        }
        Commands::Status => {
            logging::init_console(cli.debug);
            let config = load_or_exit(cli.config.as_deref());
            status(&config);
        }
    }
}

fn current_dir_or_exit() -> PathBuf {
    match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            tracing::error!(error = %err, "Failed to resolve working directory");
            std::process::exit(1);
        }
    }
}

fn load_or_exit(explicit: Option<&Path>) -> RelayConfig {
    match load_config(explicit, &current_dir_or_exit()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize output");
            std::process::exit(1);
        }
    }
}

fn run(explicit: Option<&Path>, debug: bool) {
    // Config is loaded before logging so DEBUG_MODE can raise the level.
    let loaded = load_config(explicit, &current_dir_or_exit());
    let debug = debug || loaded.as_ref().is_ok_and(|config| config.debug);
    let _logging_guard = logging::init(debug);

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        application_id = %config.application_id,
        status_file = %config.status_file.display(),
        poll_interval_ms = config.poll_interval_ms,
        "FL Studio presence relay starting"
    );

    let controls = Arc::new(OperatorControls::new());
    signal::install(controls.clone());

    let connector = IpcConnector::new(platform_endpoints(), config.application_id.clone());
    let sync_controls = controls.clone();
    let status_file = config.status_file.clone();
    let interval = config.poll_interval();
    let sync_thread = thread::Builder::new()
        .name("presence-sync".to_string())
        .spawn(move || {
            let mut sync = PresenceSync::new(
                SysinfoProbe::new(),
                JsonStatusFile::new(status_file),
                connector,
                sync_controls,
            );
            sync.run(interval);
        });
    let sync_thread = match sync_thread {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(error = %err, "Failed to start presence sync thread");
            std::process::exit(1);
        }
    };

    let console_controls = controls.clone();
    let console_thread = thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            match console::run(stdin.lock(), std::io::stdout(), &console_controls) {
                Ok(console::ConsoleExit::Quit) => {}
                Ok(console::ConsoleExit::EndOfInput) => {
                    tracing::debug!("Console input closed; waiting for interrupt");
                }
                Err(err) => tracing::warn!(error = %err, "Console input failed"),
            }
        });
    if let Err(err) = console_thread {
        tracing::warn!(error = %err, "Console unavailable; use Ctrl-C to exit");
    }

    // The console thread may still be blocked on stdin; it is not joined.
    if sync_thread.join().is_err() {
        tracing::error!("Presence sync thread panicked");
        std::process::exit(1);
    }
    tracing::info!("FL Studio presence relay stopped");
}

fn probe() {
    let mut probe = SysinfoProbe::new();
    let matches = probe.matching_processes();
    if matches.is_empty() {
        println!("FL Studio is not running");
        return;
    }
    println!("FL Studio is running");
    for (pid, name) in matches {
        println!("  {pid}\t{name}");
    }
}

fn status(config: &RelayConfig) {
    match read_status_file(&config.status_file) {
        Ok(snapshot) => {
            let activity = build_activity(&snapshot, None);
            print_json(&StatusReport { snapshot, activity });
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to read status file");
            std::process::exit(1);
        }
    }
}
