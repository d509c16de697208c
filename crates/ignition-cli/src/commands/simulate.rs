//! Simulate command
//!
//! Runs an all-to-all Kuramoto network from random phases and prints the
//! order parameter every tick.
//!
//! ```bash
//! ignition-cli simulate --nodes 16 --coupling 20 --ticks 50
//! ```

use clap::Args;
use ignition_core::Config;
use ignition_phase::{CouplingMode, KuramotoNetwork};
use serde::Serialize;
use tracing::{error, info};

use super::print_json;
use crate::error::CliExitCode;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of oscillators
    #[arg(long, default_value = "16")]
    pub nodes: usize,

    /// Coupling strength K (overrides phase.coupling_strength)
    #[arg(long)]
    pub coupling: Option<f64>,

    /// Maximum ticks to run
    #[arg(long, default_value = "50")]
    pub ticks: u64,

    /// Keep stepping after r crosses the conscious threshold
    #[arg(long)]
    pub full: bool,

    /// Seed for phases, frequencies and noise (overrides phase.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TickRow {
    tick: u64,
    time_ms: f64,
    r: f64,
    level: String,
}

#[derive(Serialize)]
struct SimulationReport {
    nodes: usize,
    coupling_strength: f64,
    threshold: f64,
    ignited_at_tick: Option<u64>,
    final_r: f64,
    trace: Vec<TickRow>,
}

pub fn handle_simulate(args: SimulateArgs, config: Config) -> i32 {
    let mut phase = config.phase;
    phase.coupling_mode = CouplingMode::Global;
    if let Some(k) = args.coupling {
        phase.coupling_strength = k;
    }
    if args.seed.is_some() {
        phase.seed = args.seed;
    }

    let mut network = match KuramotoNetwork::new(args.nodes, &phase) {
        Ok(network) => network,
        Err(e) => {
            error!("Invalid phase configuration: {}", e);
            eprintln!("Error: {}", e);
            return CliExitCode::Error.code();
        }
    };

    let dt = phase.dt();
    let threshold = phase.thresholds.conscious;
    let mut trace = Vec::with_capacity(args.ticks.min(4096) as usize + 1);
    let mut ignited_at_tick = None;
    let mut record = |network: &KuramotoNetwork| {
        let r = network.order_parameter().r;
        trace.push(TickRow {
            tick: network.ticks(),
            time_ms: network.elapsed_secs() * 1000.0,
            r,
            level: phase.thresholds.classify(r).to_string(),
        });
        r
    };

    if record(&network) >= threshold {
        ignited_at_tick = Some(0);
    }
    while network.ticks() < args.ticks {
        network.step(dt);
        let r = record(&network);
        if ignited_at_tick.is_none() && r >= threshold {
            ignited_at_tick = Some(network.ticks());
            if !args.full {
                break;
            }
        }
    }

    let report = SimulationReport {
        nodes: args.nodes,
        coupling_strength: network.coupling_strength(),
        threshold,
        ignited_at_tick,
        final_r: network.order_parameter().r,
        trace,
    };
    info!(
        nodes = report.nodes,
        ignited_at_tick = ?report.ignited_at_tick,
        final_r = report.final_r,
        "Simulation finished"
    );

    if args.json {
        if print_json(&report) != CliExitCode::Success {
            return CliExitCode::Error.code();
        }
    } else {
        println!("{:>6} {:>10} {:>8}  level", "tick", "time_ms", "r");
        for row in &report.trace {
            println!("{:>6} {:>10.1} {:>8.4}  {}", row.tick, row.time_ms, row.r, row.level);
        }
        match report.ignited_at_tick {
            Some(tick) => println!("\nr crossed {:.2} at tick {}", threshold, tick),
            None => println!("\nr stayed below {:.2} for {} ticks", threshold, args.ticks),
        }
    }

    if report.ignited_at_tick.is_some() {
        CliExitCode::Success.code()
    } else {
        CliExitCode::Negative.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(coupling: f64) -> SimulateArgs {
        SimulateArgs {
            nodes: 16,
            coupling: Some(coupling),
            ticks: 50,
            full: false,
            seed: Some(42),
            json: true,
        }
    }

    #[test]
    fn test_strong_coupling_ignites() {
        assert_eq!(handle_simulate(args(20.0), Config::default()), 0);
    }

    #[test]
    fn test_uncoupled_network_stays_incoherent() {
        assert_eq!(handle_simulate(args(0.0), Config::default()), 2);
    }

    #[test]
    fn test_unbounded_tick_budget_stops_at_ignition() {
        let mut a = args(20.0);
        a.ticks = u64::MAX;
        assert_eq!(handle_simulate(a, Config::default()), 0);
    }

    #[test]
    fn test_empty_network_is_an_error() {
        let mut a = args(20.0);
        a.nodes = 0;
        assert_eq!(handle_simulate(a, Config::default()), 1);
    }
}
