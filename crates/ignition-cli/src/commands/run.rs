//! Run command
//!
//! Starts a simulated cluster and feeds it a stream of generated sensory,
//! goal and alert signals through the control loop, then prints a tally of
//! the outcomes.
//!
//! ```bash
//! ignition-cli run --signals 20 --interval-ms 300
//! ignition-cli run --signals 100 --interval-ms 50 --seed 7 --json
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Args;
use ignition_core::salience::{SalienceProvider, SignalSource};
use ignition_core::{ClusterCollaborators, ClusterMetrics, Config, IgnitionCluster};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::print_json;
use crate::error::CliExitCode;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of signals to submit
    #[arg(long, default_value = "20")]
    pub signals: usize,

    /// Pause between submissions in milliseconds
    #[arg(long, default_value = "300")]
    pub interval_ms: u64,

    /// Seed for the signal generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Clock sync intervals to wait for readiness before the first signal
    #[arg(long, default_value = "50")]
    pub warm_up_rounds: usize,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Default)]
struct RunSummary {
    submitted: usize,
    completed: usize,
    failed: usize,
    rejected: usize,
    errors: usize,
    /// Outcome code -> count.
    outcomes: BTreeMap<String, usize>,
    mean_peak_r: Option<f64>,
    metrics: Option<ClusterMetrics>,
}

pub async fn handle_run(args: RunArgs, config: Config) -> i32 {
    let mut rng = match args.seed.or(config.fabric.seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let collaborators = ClusterCollaborators::simulated(&config);
    let cluster = match IgnitionCluster::start(config, collaborators).await {
        Ok(cluster) => cluster,
        Err(e) => {
            error!("Cluster failed to start: {}", e);
            eprintln!("Error: {}", e);
            return CliExitCode::Error.code();
        }
    };
    let clock = cluster.warm_up(args.warm_up_rounds).await;
    info!(ready = clock.ready, signals = args.signals, "Starting signal run");

    let mut summary = RunSummary::default();
    let mut peaks = Vec::new();
    for i in 0..args.signals {
        let source = random_signal(&mut rng);
        let input = source.compute_salience();
        summary.submitted += 1;

        match cluster.submit(input).await {
            Ok(outcome) => {
                let code = outcome.code();
                debug!(signal = i, source = source.name(), outcome = %code, "Signal processed");
                if !args.json {
                    println!("{:>4}  {:<8} {}", i, source.name(), code);
                }
                if let Some(event) = outcome.event() {
                    peaks.push(event.coherence.peak_r);
                }
                if outcome.is_completed() {
                    summary.completed += 1;
                } else if outcome.is_rejected() {
                    summary.rejected += 1;
                } else {
                    summary.failed += 1;
                }
                *summary.outcomes.entry(code).or_default() += 1;
            }
            Err(e) => {
                warn!(signal = i, error = %e, "Submission failed");
                summary.errors += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    if !peaks.is_empty() {
        summary.mean_peak_r = Some(peaks.iter().sum::<f64>() / peaks.len() as f64);
    }
    summary.metrics = Some(cluster.metrics());
    if let Err(e) = cluster.shutdown().await {
        warn!("Cluster shutdown reported an error: {}", e);
    }

    if args.json {
        if print_json(&summary) != CliExitCode::Success {
            return CliExitCode::Error.code();
        }
    } else {
        print_summary(&summary);
    }

    if summary.errors > 0 {
        CliExitCode::Error.code()
    } else if summary.completed == 0 {
        CliExitCode::Negative.code()
    } else {
        CliExitCode::Success.code()
    }
}

fn random_signal(rng: &mut StdRng) -> SignalSource {
    match rng.gen_range(0..3) {
        0 => SignalSource::Sensory {
            intensity: rng.gen(),
            change: rng.gen(),
        },
        1 => SignalSource::Goal {
            relevance: rng.gen(),
            deadline_pressure: rng.gen(),
        },
        _ => SignalSource::Alert {
            severity: rng.gen_range(0.3..1.0),
        },
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Signals   {}", summary.submitted);
    println!("Completed {}", summary.completed);
    println!("Failed    {}", summary.failed);
    println!("Rejected  {}", summary.rejected);
    if summary.errors > 0 {
        println!("Errors    {}", summary.errors);
    }
    if let Some(r) = summary.mean_peak_r {
        println!("Mean peak r {:.4}", r);
    }
    println!();
    for (code, count) in &summary.outcomes {
        println!("  {:<32} {}", code, count);
    }
    if let Some(metrics) = &summary.metrics {
        println!();
        println!(
            "Fabric: {} healthy of {}, clock ready {}/{}",
            metrics.fabric.healthy_nodes,
            metrics.fabric.structure.node_count,
            metrics.clock.ready,
            metrics.clock.registered
        );
    }
}
