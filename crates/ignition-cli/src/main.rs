//! Ignition Fabric CLI
//!
//! Operator tools for generating fabrics, exercising the phase engine and
//! driving a simulated cluster through ignitions.
//!
//! # Commands
//!
//! - `topology`: Generate a fabric and score its structure
//! - `simulate`: Step a Kuramoto network and print coherence per tick
//! - `trigger`: Start a simulated cluster and fire one manual trigger
//! - `run`: Feed a stream of generated signals through the control loop
//!
//! Exit codes: 0 success, 1 error, 2 when the outcome is a rejection, a
//! failed ignition or a non-compliant result.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ignition_core::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod error;

pub use error::{exit_code_for_error, CliExitCode};

/// Ignition Fabric CLI - topology, phase and ignition tooling
#[derive(Parser)]
#[command(name = "ignition-cli")]
#[command(version = "0.1.0")]
#[command(about = "Operator tools for the ignition fabric")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file (default: config/ layering plus IGNITION__* env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fabric topology and score it against the structural criteria
    Topology(commands::topology::TopologyArgs),
    /// Step a phase-coupled oscillator network and print r per tick
    Simulate(commands::simulate::SimulateArgs),
    /// Start a simulated cluster, warm its clocks and fire one trigger
    ///
    /// Prints the finalized event (or the rejection) and the event's
    /// compliance report.
    Trigger(commands::trigger::TriggerArgs),
    /// Submit a stream of generated signals through the control loop
    Run(commands::run::RunArgs),
}

fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location)
        .with_writer(std::io::stderr);
    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code_for_error(&e));
        }
    };
    init_logging(cli.verbose, &config.logging);

    // Dispatch to command handlers
    let exit_code = match cli.command {
        Commands::Topology(args) => commands::topology::handle_topology(args, config),
        Commands::Simulate(args) => commands::simulate::handle_simulate(args, config),
        Commands::Trigger(args) => commands::trigger::handle_trigger(args, config).await,
        Commands::Run(args) => commands::run::handle_run(args, config).await,
    };

    std::process::exit(exit_code);
}
