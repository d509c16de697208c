//! Modular small-world topology construction.
//!
//! Nodes are partitioned into dense modules (cliques) whose size follows from
//! the target density. One node per module acts as a gateway: gateways form
//! a ring, then chords, and the remaining edge budget is spent on bridges from
//! a gateway to a member of another module. Bridge members are picked by
//! preferential attachment (probability ∝ degree) or, with
//! `rewiring_probability`, uniformly. Leftover budget is filled by triadic
//! closure and under-connected nodes are repaired the same way.
//!
//! Every attempt is verified against the density, clustering, minimum
//! degree and connectivity goals. Attempts vary the module size around the
//! density-derived value and draw fresh randomness; both the number of
//! attempts and the edge mutations per attempt are bounded.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::metrics::{clustering_coefficient, path_statistics};
use crate::config::FabricConfig;
use crate::error::{CoreError, CoreResult};

/// Output of a successful construction.
#[derive(Debug, Clone)]
pub(crate) struct TopologyPlan {
    /// Sorted neighbor lists.
    pub adjacency: Vec<Vec<usize>>,
    /// Node indices per module; the first entry is the gateway.
    pub modules: Vec<Vec<usize>>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Build a topology satisfying `config`, or explain which goal failed.
pub(crate) fn build_topology(config: &FabricConfig, rng: &mut ChaCha8Rng) -> CoreResult<TopologyPlan> {
    config
        .validate()
        .map_err(|e| CoreError::TopologyConstruction {
            attempts: 0,
            reason: e.to_string(),
        })?;

    let n = config.node_count;
    let pairs = n * (n - 1) / 2;
    let max_edges = ((config.target_density + config.density_tolerance) * pairs as f64).floor() as usize;
    if config.min_degree * n > 2 * max_edges.min(pairs) {
        return Err(CoreError::TopologyConstruction {
            attempts: 0,
            reason: format!(
                "min_degree {} needs at least {} edges but density {:.3} allows {}",
                config.min_degree,
                (config.min_degree * n).div_ceil(2),
                config.target_density + config.density_tolerance,
                max_edges
            ),
        });
    }

    let base = module_size_for(config);
    let candidates = [base, base.saturating_sub(1).max(2), (base + 1).min(n)];
    let mut last_reason = String::new();

    for attempt in 0..config.max_attempts {
        let module_size = candidates[attempt as usize % candidates.len()];
        let adjacency = match build_once(config, module_size, rng) {
            Ok(graph) => graph,
            Err(reason) => {
                debug!(attempt, module_size, reason = %reason, "Topology attempt failed");
                last_reason = reason;
                continue;
            }
        };

        match verify(config, &adjacency.edges) {
            Ok(()) => {
                return Ok(TopologyPlan {
                    adjacency: adjacency.edges,
                    modules: adjacency.modules,
                    attempts: attempt + 1,
                })
            }
            Err(reason) => {
                debug!(attempt, module_size, reason = %reason, "Topology attempt rejected");
                last_reason = reason;
            }
        }
    }

    Err(CoreError::TopologyConstruction {
        attempts: config.max_attempts,
        reason: last_reason,
    })
}

/// Module size whose clique degree (m - 1) matches the target mean degree.
fn module_size_for(config: &FabricConfig) -> usize {
    let n = config.node_count;
    let m = (config.target_density * (n - 1) as f64).floor() as usize + 1;
    m.clamp(2, n)
}

/// Split `n` nodes into ceil(n / m) consecutive modules of near-equal size.
fn partition(n: usize, module_size: usize) -> Vec<Vec<usize>> {
    let k = n.div_ceil(module_size.max(1));
    let base = n / k;
    let extra = n % k;
    let mut modules = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        modules.push((start..start + size).collect());
        start += size;
    }
    modules
}

struct Built {
    edges: Vec<Vec<usize>>,
    modules: Vec<Vec<usize>>,
}

struct GraphBuilder {
    adjacency: Vec<BTreeSet<usize>>,
    edges: usize,
    mutations: usize,
    budget: usize,
}

impl GraphBuilder {
    fn new(n: usize, budget: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); n],
            edges: 0,
            mutations: 0,
            budget,
        }
    }

    fn add_edge(&mut self, a: usize, b: usize) -> bool {
        if a == b || self.adjacency[a].contains(&b) {
            return false;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
        self.edges += 1;
        true
    }

    /// Consume one unit of the mutation budget.
    fn spend(&mut self) -> bool {
        if self.mutations >= self.budget {
            return false;
        }
        self.mutations += 1;
        true
    }

    fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    fn random_neighbor(&self, node: usize, rng: &mut ChaCha8Rng) -> Option<usize> {
        let neighbors = &self.adjacency[node];
        if neighbors.is_empty() {
            return None;
        }
        neighbors.iter().nth(rng.gen_range(0..neighbors.len())).copied()
    }

    /// A neighbor-of-neighbor of `node` it is not yet linked to.
    fn triadic_candidate(&self, node: usize, rng: &mut ChaCha8Rng) -> Option<usize> {
        let via = self.random_neighbor(node, rng)?;
        let target = self.random_neighbor(via, rng)?;
        (target != node && !self.adjacency[node].contains(&target)).then_some(target)
    }

    /// Member of `module` drawn with probability proportional to degree.
    fn preferential(&self, module: &[usize], rng: &mut ChaCha8Rng) -> usize {
        let total: usize = module.iter().map(|&m| self.degree(m)).sum();
        if total == 0 {
            return module[rng.gen_range(0..module.len())];
        }
        let mut pick = rng.gen_range(0..total);
        for &member in module {
            let degree = self.degree(member);
            if pick < degree {
                return member;
            }
            pick -= degree;
        }
        module[module.len() - 1]
    }

    fn into_lists(self) -> Vec<Vec<usize>> {
        self.adjacency
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect()
    }
}

fn build_once(config: &FabricConfig, module_size: usize, rng: &mut ChaCha8Rng) -> Result<Built, String> {
    let n = config.node_count;
    let target = config.target_edges();
    let p_uniform = config.rewiring_probability;
    let modules = partition(n, module_size);
    let mut graph = GraphBuilder::new(n, config.max_rewiring_iterations);

    for module in &modules {
        for (i, &a) in module.iter().enumerate() {
            for &b in &module[i + 1..] {
                graph.add_edge(a, b);
            }
        }
    }

    let k = modules.len();
    if k >= 2 {
        let gateways: Vec<usize> = modules.iter().map(|m| m[0]).collect();

        for i in 0..k {
            graph.add_edge(gateways[i], gateways[(i + 1) % k]);
        }

        let mut chords: Vec<(usize, usize)> = (0..k)
            .flat_map(|i| ((i + 1)..k).map(move |j| (i, j)))
            .map(|(i, j)| (gateways[i], gateways[j]))
            .collect();
        chords.shuffle(rng);
        for (a, b) in chords {
            if graph.edges >= target {
                break;
            }
            graph.add_edge(a, b);
        }

        while graph.edges < target && graph.spend() {
            let from = rng.gen_range(0..k);
            let mut to = rng.gen_range(0..k - 1);
            if to >= from {
                to += 1;
            }
            let member = if rng.gen_bool(p_uniform) {
                modules[to][rng.gen_range(0..modules[to].len())]
            } else {
                graph.preferential(&modules[to], rng)
            };
            graph.add_edge(gateways[from], member);
        }
    }

    while graph.edges < target && graph.spend() {
        let u = rng.gen_range(0..n);
        let candidate = if graph.degree(u) > 0 && !rng.gen_bool(p_uniform) {
            graph.triadic_candidate(u, rng)
        } else {
            Some(rng.gen_range(0..n))
        };
        if let Some(w) = candidate {
            graph.add_edge(u, w);
        }
    }

    for u in 0..n {
        while graph.degree(u) < config.min_degree {
            if !graph.spend() {
                return Err(format!(
                    "mutation budget of {} exhausted repairing degree of node {}",
                    config.max_rewiring_iterations, u
                ));
            }
            let candidate = graph
                .triadic_candidate(u, rng)
                .unwrap_or_else(|| rng.gen_range(0..n));
            graph.add_edge(u, candidate);
        }
    }

    if graph.edges < target && graph.mutations >= graph.budget {
        return Err(format!(
            "mutation budget of {} exhausted at {} of {} edges",
            config.max_rewiring_iterations, graph.edges, target
        ));
    }

    Ok(Built {
        edges: graph.into_lists(),
        modules,
    })
}

fn verify(config: &FabricConfig, adjacency: &[Vec<usize>]) -> Result<(), String> {
    let n = adjacency.len();
    let edges: usize = adjacency.iter().map(Vec::len).sum::<usize>() / 2;
    let density = edges as f64 / (n * (n - 1) / 2) as f64;
    if (density - config.target_density).abs() > config.density_tolerance {
        return Err(format!(
            "density {:.4} outside {:.4} ± {:.4}",
            density, config.target_density, config.density_tolerance
        ));
    }

    let clustering = clustering_coefficient(adjacency);
    if clustering < config.min_clustering {
        return Err(format!(
            "clustering {:.4} below {:.4}",
            clustering, config.min_clustering
        ));
    }

    let min_degree = adjacency.iter().map(Vec::len).min().unwrap_or(0);
    if min_degree < config.min_degree {
        return Err(format!(
            "minimum degree {} below {}",
            min_degree, config.min_degree
        ));
    }

    let (_, _, connected) = path_statistics(adjacency);
    if !connected {
        return Err("graph is not connected".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config(n: usize, density: f64) -> FabricConfig {
        FabricConfig {
            node_count: n,
            target_density: density,
            ..FabricConfig::default()
        }
    }

    #[test]
    fn test_partition_is_even() {
        let modules = partition(32, 7);
        let sizes: Vec<usize> = modules.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![7, 7, 6, 6, 6]);
        assert_eq!(modules.iter().map(Vec::len).sum::<usize>(), 32);
        assert_eq!(modules[1][0], 7);
    }

    #[test]
    fn test_module_size_follows_density() {
        assert_eq!(module_size_for(&config(32, 0.20)), 7);
        assert_eq!(module_size_for(&config(12, 1.0)), 12);
        assert_eq!(module_size_for(&config(100, 0.01)), 2);
    }

    #[test]
    fn test_32_nodes_at_density_020() {
        for seed in 0..5 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let plan = build_topology(&config(32, 0.20), &mut rng).unwrap();
            let edges: usize = plan.adjacency.iter().map(Vec::len).sum::<usize>() / 2;
            let density = edges as f64 / 496.0;
            assert!((density - 0.20).abs() <= 0.02, "seed {} density {}", seed, density);
            assert!(clustering_coefficient(&plan.adjacency) >= 0.75);
            assert!(plan.adjacency.iter().all(|nb| nb.len() >= 3));
        }
    }

    #[test]
    fn test_full_density_is_a_clique() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let plan = build_topology(&config(12, 1.0), &mut rng).unwrap();
        assert!(plan.adjacency.iter().all(|nb| nb.len() == 11));
        assert_eq!(plan.modules.len(), 1);
        assert_eq!(plan.attempts, 1);
    }

    #[test]
    fn test_adjacency_is_symmetric_without_self_loops() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let plan = build_topology(&config(48, 0.15), &mut rng).unwrap();
        for (i, neighbors) in plan.adjacency.iter().enumerate() {
            assert!(!neighbors.contains(&i));
            for &j in neighbors {
                assert!(plan.adjacency[j].contains(&i));
            }
        }
    }

    #[test]
    fn test_unreachable_min_degree_fails_before_any_attempt() {
        let mut cfg = config(32, 0.05);
        cfg.min_degree = 10;
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        match build_topology(&cfg, &mut rng) {
            Err(CoreError::TopologyConstruction { attempts, reason }) => {
                assert_eq!(attempts, 0);
                assert!(reason.contains("min_degree"));
            }
            other => panic!("expected TopologyConstruction, got {:?}", other.map(|p| p.attempts)),
        }
    }

    #[test]
    fn test_impossible_clustering_exhausts_attempts() {
        // A sparse ring-like fabric cannot be both this sparse and this clustered.
        let mut cfg = config(40, 0.06);
        cfg.min_clustering = 0.99;
        cfg.min_degree = 1;
        cfg.max_attempts = 4;
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        match build_topology(&cfg, &mut rng) {
            Err(CoreError::TopologyConstruction { attempts, reason }) => {
                assert_eq!(attempts, 4);
                assert!(reason.contains("clustering"), "reason: {}", reason);
            }
            other => panic!("expected failure, got {:?}", other.map(|p| p.attempts)),
        }
    }

    #[test]
    fn test_out_of_bounds_parameters_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = build_topology(&config(32, 1.4), &mut rng).unwrap_err();
        assert!(matches!(err, CoreError::TopologyConstruction { attempts: 0, .. }));
    }
}
