//! Trigger command
//!
//! Starts a simulated cluster, waits for clock readiness and fires one
//! manual trigger. The cluster is shut down before the command returns.
//!
//! ```bash
//! ignition-cli trigger --novelty 0.9 --relevance 0.8 --urgency 0.85
//! ignition-cli trigger --novelty 0.9 --relevance 0.8 --urgency 0.85 \
//!     --context '{"alarm": "pressure"}' --json
//! ```

use std::sync::Arc;

use clap::Args;
use ignition_core::coordinator::FixedArousal;
use ignition_core::validation::EventCompliance;
use ignition_core::{
    ClusterCollaborators, Config, IgnitionCluster, IgnitionEvent, SalienceInput, TriggerOutcome,
};
use serde::Serialize;
use tracing::{error, info, warn};

use super::print_json;
use crate::error::CliExitCode;

#[derive(Args, Debug)]
pub struct TriggerArgs {
    #[arg(long)]
    pub novelty: f64,

    #[arg(long)]
    pub relevance: f64,

    #[arg(long)]
    pub urgency: f64,

    #[arg(long, default_value = "1.0")]
    pub confidence: f64,

    /// Label recorded as the event's source
    #[arg(long, default_value = "manual")]
    pub source: String,

    /// Event content as a JSON document
    #[arg(long)]
    pub context: Option<String>,

    /// Arousal level in [0, 1] (overrides coordinator.initial_arousal)
    #[arg(long)]
    pub arousal: Option<f64>,

    /// Clock sync intervals to wait for readiness before triggering
    #[arg(long, default_value = "50")]
    pub warm_up_rounds: usize,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TriggerReport {
    outcome: TriggerOutcome,
    compliance: Option<EventCompliance>,
}

pub async fn handle_trigger(args: TriggerArgs, mut config: Config) -> i32 {
    let context = match args.context.as_deref().map(serde_json::from_str) {
        None => serde_json::Value::Null,
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            error!("Invalid --context JSON: {}", e);
            eprintln!("Error: --context is not valid JSON: {}", e);
            return CliExitCode::Error.code();
        }
    };
    let input = SalienceInput::new(args.novelty, args.relevance, args.urgency)
        .with_confidence(args.confidence)
        .with_source(args.source)
        .with_context(context);

    if let Some(arousal) = args.arousal {
        config.coordinator.initial_arousal = arousal;
    }
    let mut collaborators = ClusterCollaborators::simulated(&config);
    collaborators.arousal = Arc::new(FixedArousal(config.coordinator.initial_arousal));

    let cluster = match IgnitionCluster::start(config, collaborators).await {
        Ok(cluster) => cluster,
        Err(e) => {
            error!("Cluster failed to start: {}", e);
            eprintln!("Error: {}", e);
            return CliExitCode::Error.code();
        }
    };

    let clock = cluster.warm_up(args.warm_up_rounds).await;
    info!(
        ready = clock.ready,
        registered = clock.registered,
        max_abs_offset_ns = clock.max_abs_offset_ns,
        "Clock warm-up finished"
    );

    let result = cluster.trigger(input).await;
    let report = result.map(|outcome| {
        let compliance = outcome.event().map(|event| cluster.score_event(event));
        TriggerReport { outcome, compliance }
    });

    if let Err(e) = cluster.shutdown().await {
        warn!("Cluster shutdown reported an error: {}", e);
    }

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            error!("Trigger failed: {}", e);
            eprintln!("Error: {}", e);
            return CliExitCode::Error.code();
        }
    };

    if args.json {
        if print_json(&report) != CliExitCode::Success {
            return CliExitCode::Error.code();
        }
    } else {
        print_report(&report);
    }

    if report.outcome.is_completed() {
        CliExitCode::Success.code()
    } else {
        CliExitCode::Negative.code()
    }
}

fn print_report(report: &TriggerReport) {
    match &report.outcome {
        TriggerOutcome::Rejected(decision) => {
            println!("REJECTED");
            println!(
                "  salience  {:.3} ({}) against threshold {:.3}",
                decision.score.total, decision.score.level, decision.effective_threshold
            );
            for reason in &decision.reasons {
                println!("  {}: {}", reason.code(), reason);
            }
            return;
        }
        TriggerOutcome::Completed(event) => {
            println!("COMPLETED");
            print_event(event);
        }
        TriggerOutcome::Failed(event) => {
            println!("FAILED");
            if let Some(failure) = &event.failure {
                println!("  {}: {}", failure.code(), failure);
            }
            print_event(event);
        }
    }

    if let Some(compliance) = &report.compliance {
        println!();
        println!(
            "Compliance {:.2} ({})",
            compliance.score,
            if compliance.compliant { "compliant" } else { "non-compliant" }
        );
        for check in &compliance.checks {
            let value = check
                .value
                .map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
            let mark = if check.passed { "ok" } else { "FAIL" };
            println!("  {:<22} {:>10}  {}", check.criterion.to_string(), value, mark);
        }
    }
}

fn print_event(event: &IgnitionEvent) {
    let c = &event.coherence;
    println!("  event     {} (seq {})", event.id, event.sequence);
    println!("  source    {}", event.source);
    println!("  salience  {:.3} ({})", event.salience.total, event.salience.level);
    println!("  phase     {}", event.phase);
    let path: Vec<String> = event.transitions.iter().map(|t| t.to.to_string()).collect();
    println!("  path      {}", path.join(" -> "));
    println!(
        "  nodes     {} / {} eligible",
        event.participating_nodes.len(),
        event.eligible_nodes.len()
    );
    println!(
        "  coherence peak {:.4}  mean {:.4}  final {:.4}",
        c.peak_r, c.mean_r, c.final_r
    );
    match c.time_to_ignition_ms {
        Some(ms) => println!(
            "  sync      {} ticks, {:.1} ms oscillator time, {:.3} ms to ignition",
            c.sync_ticks, c.sync_time_ms, ms
        ),
        None => println!("  sync      {} ticks, never ignited", c.sync_ticks),
    }
    if let Some(broadcast) = &event.broadcast {
        println!(
            "  broadcast {} delivered, {} failed, {} skipped",
            broadcast.delivered,
            broadcast.failed.len(),
            broadcast.skipped.len()
        );
    }
    println!("  sustain   {:.1} ms", event.sustain_duration_ms);
    if let Some(ms) = event.duration_ms() {
        println!("  duration  {:.1} ms", ms);
    }
}
