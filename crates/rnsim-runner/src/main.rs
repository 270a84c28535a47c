//! `rnsim` command-line runner.
//!
//! ```bash
//! # Run a scenario for its configured duration
//! rnsim run scenarios/two_cell.yaml
//!
//! # Override seed and duration, print counters as JSON
//! rnsim run scenarios/two_cell.yaml --seed 7 --duration-ms 250 --json
//!
//! # Check a scenario without running it
//! rnsim validate scenarios/two_cell.yaml
//! ```

use clap::{Parser, Subcommand};
use rnsim_common::{SimError, SimTime};
use rnsim_model::{build_simulation, load_model, ModelError};
use rnsim_node::RadioNodeStats;
use rnsim_runner::{SimulationStats, Simulator};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Packet-level radio network simulator
#[derive(Parser, Debug)]
#[command(name = "rnsim")]
#[command(version, about = "Packet-level radio network simulator")]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario
    Run {
        /// Scenario YAML file
        scenario: PathBuf,

        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Run length in milliseconds (overrides the scenario)
        #[arg(long)]
        duration_ms: Option<f64>,

        /// Print the run counters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and check a scenario without running it
    Validate {
        /// Scenario YAML file
        scenario: PathBuf,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("Invalid duration {0} ms")]
    Duration(f64),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();
    rnsim_metrics::describe_metrics();

    let result = match cli.command {
        Command::Run { scenario, seed, duration_ms, json } => cmd_run(&scenario, seed, duration_ms, json),
        Command::Validate { scenario } => cmd_validate(&scenario),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(path: &Path, seed: u64, duration_ms: Option<f64>, json: bool) -> Result<(), CliError> {
    let model = load_model(path)?;
    let simulation = build_simulation(&model, seed)?;
    let until = match duration_ms {
        Some(ms) if ms.is_finite() && ms > 0.0 => SimTime::from_secs(ms / 1e3),
        Some(ms) => return Err(CliError::Duration(ms)),
        None => simulation.duration,
    };

    info!(scenario = %path.display(), seed, until = %until, "starting");
    let mut sim = Simulator::from_simulation(simulation)?;
    let stats = sim.run(until)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_summary(&stats);
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<(), CliError> {
    let model = load_model(path)?;
    // Building catches component-level configuration errors too.
    let simulation = build_simulation(&model, 0)?;
    println!(
        "{}: {} nodes, channel {}, {} ms",
        path.display(),
        simulation.nodes.len(),
        simulation.channel.name(),
        model.simulation.duration_ms
    );
    Ok(())
}

fn print_summary(stats: &SimulationStats) {
    println!("Simulated {} in {} iterations", stats.final_time, stats.iterations);
    println!(
        "Packets: {} transmitted, {} delivered, {} dropped",
        stats.packets_transmitted, stats.packets_delivered, stats.packets_dropped
    );
    println!();
    println!(
        "{:<12} {:>9} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "node", "generated", "tx", "retx", "rx", "crc_err", "cqi_rep"
    );
    for report in &stats.nodes {
        let Ok(node) = RadioNodeStats::deserialize(report) else {
            continue;
        };
        println!(
            "{:<12} {:>9} {:>8} {:>8} {:>8} {:>8} {:>8}",
            node.name,
            node.generated,
            node.phy.blocks_transmitted,
            node.phy.retransmissions,
            node.phy.blocks_received,
            node.phy.crc_failures,
            node.mac.cqi_reports,
        );
    }
}
