//! Property-based tests for dagstore using proptest.
//!
//! Random edge lists are pushed through the cycle guard, then the stored
//! graph is checked against invariants every DAG must satisfy.

use std::collections::BTreeSet;

use proptest::prelude::*;

use dagstore::db::GraphSchema;
use dagstore::{Dag, DagError, EdgePredicate, EdgeStore, GuardOptions, NodeId, SqliteStore};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// Node count plus candidate edges given as index pairs into the node list.
fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..=8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..=12)))
}

struct Built {
    dag: Dag<SqliteStore>,
    ids: Vec<NodeId>,
    accepted: Vec<(NodeId, NodeId)>,
    rejected: Vec<(NodeId, NodeId)>,
}

fn build(n: usize, candidates: &[(usize, usize)]) -> Built {
    let dag = Dag::in_memory(GraphSchema::default()).unwrap();
    let ids: Vec<NodeId> = (0..n).map(|_| dag.add_node().unwrap()).collect();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for &(p, c) in candidates {
        match dag.add_child(ids[p], ids[c], GuardOptions::default()) {
            Ok(_) => accepted.push((ids[p], ids[c])),
            Err(DagError::CyclicEdgeRejected { .. }) => rejected.push((ids[p], ids[c])),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    Built {
        dag,
        ids,
        accepted,
        rejected,
    }
}

fn reachability(dag: &Dag<SqliteStore>, ids: &[NodeId]) -> BTreeSet<(NodeId, NodeId)> {
    let mut pairs = BTreeSet::new();
    for &a in ids {
        for d in dag.descendants(a, None).unwrap() {
            pairs.insert((a, d));
        }
    }
    pairs
}

// ---------------------------------------------------------------------------
// Guard invariants
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn no_node_reaches_itself((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        for &id in &g.ids {
            prop_assert!(!g.dag.descendants(id, None).unwrap().contains(&id));
            prop_assert!(!g.dag.ancestors(id, None).unwrap().contains(&id));
        }
    }

    #[test]
    fn rejected_edges_would_have_closed_a_cycle((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        for &(p, c) in &g.rejected {
            prop_assert!(p == c || g.dag.is_ancestor_of(c, p).unwrap());
        }
    }

    #[test]
    fn every_accepted_edge_is_stored((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        let stored = g.dag.store().count_edges(&EdgePredicate::All).unwrap();
        prop_assert_eq!(stored, g.accepted.len());
    }
}

// ---------------------------------------------------------------------------
// Traversal invariants
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn topological_order_respects_every_edge((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        let order = g.dag.topological_sort().unwrap();
        prop_assert_eq!(order.len(), n);
        let position = |id: NodeId| order.iter().position(|x| *x == id).unwrap();
        for &(p, c) in &g.accepted {
            prop_assert!(position(p) < position(c));
        }
    }

    #[test]
    fn paths_run_from_start_to_end_along_edges((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        let stored: BTreeSet<(NodeId, NodeId)> = g.accepted.iter().copied().collect();
        for &(p, c) in &g.accepted {
            let path = g.dag.path(p, c, &Default::default()).unwrap();
            prop_assert_eq!(path.start(), Some(p));
            prop_assert_eq!(path.end(), Some(c));
            prop_assert_eq!(path.hops(), 1);
            for pair in path.nodes.windows(2) {
                prop_assert!(stored.contains(&(pair[0], pair[1])));
            }
        }
    }

    #[test]
    fn ancestors_mirror_descendants((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        for &a in &g.ids {
            for d in g.dag.descendants(a, None).unwrap() {
                prop_assert!(g.dag.ancestors(d, None).unwrap().contains(&a));
            }
        }
    }

    #[test]
    fn reduction_keeps_reachability((n, edges) in arb_graph()) {
        let g = build(n, &edges);
        let before = reachability(&g.dag, &g.ids);
        g.dag.transitive_reduction(true).unwrap();
        prop_assert_eq!(reachability(&g.dag, &g.ids), before);
        prop_assert!(g.dag.redundant_edges().unwrap().is_empty());
    }
}
