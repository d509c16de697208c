//! Property tests for topology compliance scoring.

use ignition_core::fabric::StructuralMetrics;
use ignition_core::validation::{score_topology, TopologyCriteria};
use proptest::prelude::*;

fn metrics_strategy() -> impl Strategy<Value = StructuralMetrics> {
    (
        2usize..200,
        0.0f64..1.0,
        0.5f64..10.0,
        0.0f64..3.0,
        any::<bool>(),
    )
        .prop_map(|(node_count, clustering, apl, lambda2, connected)| StructuralMetrics {
            node_count,
            clustering_coefficient: clustering,
            average_path_length: apl,
            algebraic_connectivity: lambda2,
            connected,
            ..Default::default()
        })
}

proptest! {
    #[test]
    fn compliant_implies_all_invariants(metrics in metrics_strategy()) {
        let criteria = TopologyCriteria::default();
        let report = score_topology(&metrics, &criteria);
        if report.compliant {
            prop_assert!(metrics.clustering_coefficient >= 0.75);
            prop_assert!(metrics.average_path_length <= (metrics.node_count as f64).ln());
            prop_assert!(metrics.algebraic_connectivity >= 0.3);
            prop_assert!(metrics.connected);
        } else {
            prop_assert!(!report.violations.is_empty());
        }
    }

    #[test]
    fn non_finite_metrics_never_compliant(node_count in 2usize..100) {
        let metrics = StructuralMetrics {
            node_count,
            clustering_coefficient: f64::NAN,
            average_path_length: 1.0,
            algebraic_connectivity: 1.0,
            connected: true,
            ..Default::default()
        };
        prop_assert!(!score_topology(&metrics, &TopologyCriteria::default()).compliant);
    }
}
