//! Topology command
//!
//! ```bash
//! ignition-cli topology --nodes 32 --density 0.2 --seed 7
//! ignition-cli topology --json
//! ```

use clap::Args;
use ignition_core::fabric::StructuralMetrics;
use ignition_core::validation::{score_topology, TopologyCompliance};
use ignition_core::{Config, TopologyFabric};
use serde::Serialize;
use tracing::{error, info};

use super::print_json;
use crate::error::CliExitCode;

#[derive(Args, Debug)]
pub struct TopologyArgs {
    /// Node count (overrides fabric.node_count)
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Target edge density (overrides fabric.target_density)
    #[arg(long)]
    pub density: Option<f64>,

    /// Construction seed (overrides fabric.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TopologyReport {
    metrics: StructuralMetrics,
    modules: usize,
    compliance: TopologyCompliance,
}

pub fn handle_topology(args: TopologyArgs, mut config: Config) -> i32 {
    if let Some(nodes) = args.nodes {
        config.fabric.node_count = nodes;
    }
    if let Some(density) = args.density {
        config.fabric.target_density = density;
    }
    if args.seed.is_some() {
        config.fabric.seed = args.seed;
    }

    let fabric = match TopologyFabric::initialize(&config.fabric) {
        Ok(fabric) => fabric,
        Err(e) => {
            error!("Topology construction failed: {}", e);
            eprintln!("Error: {}", e);
            return CliExitCode::Error.code();
        }
    };
    let metrics = fabric.metrics().structure;
    let report = TopologyReport {
        metrics,
        modules: fabric.modules().len(),
        compliance: score_topology(&metrics, &config.validation.topology),
    };
    info!(
        nodes = metrics.node_count,
        edges = metrics.edge_count,
        compliant = report.compliance.compliant,
        "Topology generated"
    );

    if args.json {
        if print_json(&report) != CliExitCode::Success {
            return CliExitCode::Error.code();
        }
    } else {
        print_report(&report);
    }

    if report.compliance.compliant {
        CliExitCode::Success.code()
    } else {
        CliExitCode::Negative.code()
    }
}

fn print_report(report: &TopologyReport) {
    let m = &report.metrics;
    println!("Fabric topology");
    println!("  nodes                  {}", m.node_count);
    println!("  edges                  {}", m.edge_count);
    println!("  modules                {}", report.modules);
    println!("  density                {:.4}", m.density);
    println!(
        "  degree (min/avg/max)   {} / {:.2} / {}",
        m.min_degree, m.average_degree, m.max_degree
    );
    println!("  clustering             {:.4}", m.clustering_coefficient);
    println!(
        "  avg path length        {:.4} (max {:.4})",
        m.average_path_length, report.compliance.max_path_length
    );
    println!("  diameter               {}", m.diameter);
    println!("  algebraic connectivity {:.4}", m.algebraic_connectivity);
    println!();
    if report.compliance.compliant {
        println!("COMPLIANT");
    } else {
        println!("NON-COMPLIANT");
        for violation in &report.compliance.violations {
            println!("  {}: {}", violation.code(), violation);
        }
    }
}
