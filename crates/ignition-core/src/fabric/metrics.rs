//! Structural graph metrics.
//!
//! All functions take an adjacency list in index space (`adjacency[i]` holds
//! the neighbors of node `i`, symmetric, no self loops).

use std::collections::VecDeque;

use super::types::StructuralMetrics;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-20;

/// Compute every structural metric of a graph.
pub fn structural_metrics(adjacency: &[Vec<usize>]) -> StructuralMetrics {
    let n = adjacency.len();
    if n == 0 {
        return StructuralMetrics::default();
    }

    let degree_sum: usize = adjacency.iter().map(Vec::len).sum();
    let edge_count = degree_sum / 2;
    let pairs = n * (n - 1) / 2;
    let (average_path_length, diameter, connected) = path_statistics(adjacency);

    StructuralMetrics {
        node_count: n,
        edge_count,
        density: if pairs == 0 {
            0.0
        } else {
            edge_count as f64 / pairs as f64
        },
        average_degree: degree_sum as f64 / n as f64,
        min_degree: adjacency.iter().map(Vec::len).min().unwrap_or(0),
        max_degree: adjacency.iter().map(Vec::len).max().unwrap_or(0),
        clustering_coefficient: clustering_coefficient(adjacency),
        average_path_length,
        diameter,
        algebraic_connectivity: algebraic_connectivity(adjacency),
        connected,
    }
}

/// Average local clustering coefficient. Nodes with degree < 2 contribute 0.
pub fn clustering_coefficient(adjacency: &[Vec<usize>]) -> f64 {
    let n = adjacency.len();
    if n == 0 {
        return 0.0;
    }
    let matrix = dense_matrix(adjacency);

    let total: f64 = adjacency
        .iter()
        .map(|neighbors| {
            let k = neighbors.len();
            if k < 2 {
                return 0.0;
            }
            let mut links = 0usize;
            for (i, &a) in neighbors.iter().enumerate() {
                for &b in &neighbors[i + 1..] {
                    if matrix[a * n + b] {
                        links += 1;
                    }
                }
            }
            2.0 * links as f64 / (k * (k - 1)) as f64
        })
        .sum();

    total / n as f64
}

/// Local clustering coefficient of one node.
pub fn local_clustering(adjacency: &[Vec<usize>], node: usize) -> f64 {
    let neighbors = &adjacency[node];
    let k = neighbors.len();
    if k < 2 {
        return 0.0;
    }
    let links = neighbors
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            neighbors[i + 1..]
                .iter()
                .filter(|b| adjacency[a].contains(b))
                .count()
        })
        .sum::<usize>();
    2.0 * links as f64 / (k * (k - 1)) as f64
}

/// BFS from every node. Returns (mean shortest path over reachable ordered
/// pairs, diameter, whether every pair is reachable).
pub fn path_statistics(adjacency: &[Vec<usize>]) -> (f64, usize, bool) {
    let n = adjacency.len();
    if n < 2 {
        return (0.0, 0, true);
    }

    let mut total = 0usize;
    let mut reachable_pairs = 0usize;
    let mut diameter = 0usize;
    let mut distance = vec![usize::MAX; n];
    let mut queue = VecDeque::with_capacity(n);

    for source in 0..n {
        distance.iter_mut().for_each(|d| *d = usize::MAX);
        distance[source] = 0;
        queue.clear();
        queue.push_back(source);

        while let Some(u) = queue.pop_front() {
            for &v in &adjacency[u] {
                if distance[v] == usize::MAX {
                    distance[v] = distance[u] + 1;
                    total += distance[v];
                    reachable_pairs += 1;
                    diameter = diameter.max(distance[v]);
                    queue.push_back(v);
                }
            }
        }
    }

    let connected = reachable_pairs == n * (n - 1);
    let apl = if reachable_pairs == 0 {
        0.0
    } else {
        total as f64 / reachable_pairs as f64
    };
    (apl, diameter, connected)
}

/// Second-smallest eigenvalue of the graph Laplacian L = D - A.
///
/// Zero for disconnected graphs.
pub fn algebraic_connectivity(adjacency: &[Vec<usize>]) -> f64 {
    let n = adjacency.len();
    if n < 2 {
        return 0.0;
    }

    let mut laplacian = vec![vec![0.0; n]; n];
    for (i, neighbors) in adjacency.iter().enumerate() {
        laplacian[i][i] = neighbors.len() as f64;
        for &j in neighbors {
            laplacian[i][j] = -1.0;
        }
    }

    let eigenvalues = symmetric_eigenvalues(laplacian);
    eigenvalues[1].max(0.0)
}

/// Eigenvalues of a symmetric matrix by cyclic Jacobi rotations, ascending.
pub fn symmetric_eigenvalues(mut a: Vec<Vec<f64>>) -> Vec<f64> {
    let n = a.len();

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off_diagonal: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off_diagonal < JACOBI_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (akp, akq) = (row[p], row[q]);
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
            }
        }
    }

    let mut eigenvalues: Vec<f64> = (0..n).map(|i| a[i][i]).collect();
    eigenvalues.sort_by(|x, y| x.total_cmp(y));
    eigenvalues
}

fn dense_matrix(adjacency: &[Vec<usize>]) -> Vec<bool> {
    let n = adjacency.len();
    let mut matrix = vec![false; n * n];
    for (i, neighbors) in adjacency.iter().enumerate() {
        for &j in neighbors {
            matrix[i * n + j] = true;
        }
    }
    matrix
}
