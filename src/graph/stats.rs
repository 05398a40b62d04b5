//! Graph-wide operations: roots, leaves and islands, components, layered
//! ordering, critical path, transitive reduction and summary statistics.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::graph::Dag;
use crate::query::{CriticalPathQuery, TopologicalSortQuery, TransitiveReductionQuery};
use crate::store::{EdgePredicate, EdgeStore};
use crate::types::{Edge, NodeDepth, NodeId, WeightedPath};

/// What [`Dag::transitive_reduction`] found, and removed when applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReductionOutcome {
    /// Edges implied by a longer path, by edge id.
    pub redundant: Vec<Edge>,
    /// Edges deleted; 0 for a dry run.
    pub deleted: usize,
}

/// Summary of the whole graph.
///
/// Roots and leaves both count islands. Depths are layer depths, the longest
/// distance from a root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub island_count: usize,
    pub max_depth: u32,
    pub avg_depth: f64,
    /// `E / (N (N - 1))`, 0 below two nodes.
    pub density: f64,
    pub component_count: usize,
}

impl GraphStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "node_count": self.node_count,
            "edge_count": self.edge_count,
            "root_count": self.root_count,
            "leaf_count": self.leaf_count,
            "island_count": self.island_count,
            "max_depth": self.max_depth,
            "avg_depth": self.avg_depth,
            "density": self.density,
            "component_count": self.component_count,
        })
    }
}

/// Which nodes have an incoming or an outgoing edge.
struct Degrees {
    nodes: Vec<NodeId>,
    with_parents: BTreeSet<NodeId>,
    with_children: BTreeSet<NodeId>,
    links: Vec<(NodeId, NodeId)>,
}

impl Degrees {
    fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !self.with_parents.contains(n))
            .copied()
            .collect()
    }

    fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !self.with_children.contains(n))
            .copied()
            .collect()
    }

    fn islands(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !self.with_parents.contains(n) && !self.with_children.contains(n))
            .copied()
            .collect()
    }

    /// Weakly connected components over every stored edge, with no depth
    /// bound.
    fn components(&self) -> Vec<Vec<NodeId>> {
        let mut neighbours: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for &(parent, child) in &self.links {
            neighbours.entry(parent).or_default().push(child);
            neighbours.entry(child).or_default().push(parent);
        }

        let mut pending: BTreeSet<NodeId> = self.nodes.iter().copied().collect();
        let mut components = Vec::new();
        while let Some(first) = pending.pop_first() {
            let mut component = BTreeSet::from([first]);
            let mut frontier = vec![first];
            while let Some(node) = frontier.pop() {
                for next in neighbours.get(&node).into_iter().flatten() {
                    if pending.remove(next) {
                        component.insert(*next);
                        frontier.push(*next);
                    }
                }
            }
            components.push(component.into_iter().collect());
        }
        components
    }
}

impl<S: EdgeStore> Dag<S> {
    fn degrees(&self) -> Result<Degrees> {
        let nodes = self.store.all_nodes()?;
        let edges = self.store.fetch_edges(&EdgePredicate::All)?;
        Ok(Degrees {
            nodes,
            with_parents: edges.iter().map(|e| e.child).collect(),
            with_children: edges.iter().map(|e| e.parent).collect(),
            links: edges.iter().map(Edge::pair).collect(),
        })
    }

    /// Nodes without parents, islands included, by id.
    pub fn roots(&self) -> Result<Vec<NodeId>> {
        Ok(self.degrees()?.roots())
    }

    /// Nodes without children, islands included, by id.
    pub fn leaves(&self) -> Result<Vec<NodeId>> {
        Ok(self.degrees()?.leaves())
    }

    /// Nodes without any edge, by id.
    pub fn islands(&self) -> Result<Vec<NodeId>> {
        Ok(self.degrees()?.islands())
    }

    /// Weakly connected components, each sorted by id, ordered by their
    /// smallest id.
    ///
    /// Built from one read of the node and edge tables, so components are
    /// maximal however long their chains run.
    pub fn connected_components(&self) -> Result<Vec<Vec<NodeId>>> {
        Ok(self.degrees()?.components())
    }

    /// Layer depth of every node touching an edge, shallowest first.
    pub(crate) fn layered(&self) -> Result<Vec<NodeDepth>> {
        self.store
            .run(&TopologicalSortQuery::new().filter(self.bounded(None)))
    }

    /// Every node with parents before children; islands first.
    ///
    /// Layering stops at the configured `max_depth`. Nodes only reachable
    /// past it are left out, and a warning is logged whenever the bound cut
    /// the walk short.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        let degrees = self.degrees()?;
        let layers = self.layered()?;
        let max_depth = self.config.max_depth;
        let cut = layers
            .iter()
            .any(|n| n.depth >= max_depth && degrees.with_children.contains(&n.id));

        let mut order = degrees.islands();
        order.extend(layers.into_iter().map(|n| n.id));
        if cut {
            warn!(
                max_depth,
                ordered = order.len(),
                nodes = degrees.nodes.len(),
                "topological order truncated at the depth bound"
            );
        }
        Ok(order)
    }

    /// Heaviest root-to-leaf path, by edge count when `weight_field` is
    /// `None`.
    pub fn critical_path(&self, weight_field: Option<&str>) -> Result<WeightedPath> {
        let mut query = CriticalPathQuery::new().filter(self.bounded(None));
        if let Some(field) = weight_field {
            query = query.weight_field(field);
        }
        self.store.run(&query)
    }

    /// Edges also implied by a path of two or more edges.
    pub fn redundant_edges(&self) -> Result<Vec<Edge>> {
        let ids = self
            .store
            .run(&TransitiveReductionQuery::new().filter(self.bounded(None)))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.fetch_edges(&EdgePredicate::Ids(ids))
    }

    /// Find redundant edges and, with `apply`, delete them in one write
    /// scope.
    pub fn transitive_reduction(&self, apply: bool) -> Result<ReductionOutcome> {
        if !apply {
            return Ok(ReductionOutcome {
                redundant: self.redundant_edges()?,
                deleted: 0,
            });
        }
        self.store.atomically(|| {
            let redundant = self.redundant_edges()?;
            let deleted = if redundant.is_empty() {
                0
            } else {
                let ids = redundant.iter().map(|e| e.id).collect();
                self.store.delete_edges(&EdgePredicate::Ids(ids))?
            };
            info!(deleted, "transitive reduction applied");
            Ok(ReductionOutcome { redundant, deleted })
        })
    }

    pub fn graph_stats(&self) -> Result<GraphStats> {
        let degrees = self.degrees()?;
        let layers: Vec<u32> = self.layered()?.into_iter().map(|n| n.depth).collect();
        let node_count = degrees.nodes.len();
        let edge_count = degrees.links.len();

        let max_depth = layers.iter().copied().max().unwrap_or(0);
        let avg_depth = if node_count == 0 {
            0.0
        } else {
            layers.iter().map(|d| f64::from(*d)).sum::<f64>() / node_count as f64
        };
        let density = if node_count < 2 {
            0.0
        } else {
            edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
        };

        Ok(GraphStats {
            node_count,
            edge_count,
            root_count: degrees.roots().len(),
            leaf_count: degrees.leaves().len(),
            island_count: degrees.islands().len(),
            max_depth,
            avg_depth,
            density,
            component_count: degrees.components().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DagError;
    use crate::graph::fixtures::{link, nodes, setup, small};
    use crate::guard::GuardOptions;
    use crate::types::NewEdge;
    use pretty_assertions::assert_eq;

    /// A -> B -> D, A -> C -> D, A -> D.
    fn diamond_with_shortcut(dag: &Dag<crate::store::SqliteStore>) -> Vec<NodeId> {
        let n = nodes(dag, 4);
        for (p, c) in [(0, 1), (1, 3), (0, 2), (2, 3), (0, 3)] {
            link(dag, n[p], n[c]);
        }
        n
    }

    #[test]
    fn roots_leaves_and_islands() {
        let dag = setup();
        let g = small(&dag);
        assert_eq!(dag.roots().unwrap(), vec![g.root, g.island]);
        assert_eq!(dag.leaves().unwrap(), vec![g.b1, g.b2, g.island]);
        assert_eq!(dag.islands().unwrap(), vec![g.island]);
    }

    #[test]
    fn components_split_on_islands() {
        let dag = setup();
        let g = small(&dag);
        let components = dag.connected_components().unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 6);
        assert_eq!(components[1], vec![g.island]);
    }

    /// `len` nodes linked in id order.
    fn chain(dag: &Dag<crate::store::SqliteStore>, len: usize) -> Vec<NodeId> {
        let n = nodes(dag, len);
        for pair in n.windows(2) {
            link(dag, pair[0], pair[1]);
        }
        n
    }

    #[test]
    fn components_span_chains_longer_than_the_depth_bound() {
        let dag = setup();
        let n = chain(&dag, 30);
        let island = dag.add_node().unwrap();
        let components = dag.connected_components().unwrap();
        assert_eq!(components, vec![n, vec![island]]);
        assert_eq!(dag.graph_stats().unwrap().component_count, 2);
    }

    #[test]
    fn components_join_through_shared_children() {
        let dag = setup();
        let n = nodes(&dag, 5);
        link(&dag, n[0], n[2]);
        link(&dag, n[1], n[2]);
        link(&dag, n[3], n[4]);
        assert_eq!(
            dag.connected_components().unwrap(),
            vec![vec![n[0], n[1], n[2]], vec![n[3], n[4]]]
        );
    }

    #[test]
    fn topological_sort_stops_at_the_depth_bound() {
        let dag = setup();
        let n = chain(&dag, 30);
        assert_eq!(dag.topological_sort().unwrap(), n[..21].to_vec());

        let store = crate::store::SqliteStore::in_memory(crate::db::GraphSchema::default()).unwrap();
        let config = crate::config::DagConfig {
            max_depth: 40,
            ..Default::default()
        };
        let deep = Dag::new(store, config).unwrap();
        let n = chain(&deep, 30);
        assert_eq!(deep.topological_sort().unwrap(), n);
    }

    #[test]
    fn topological_sort_puts_islands_first() {
        let dag = setup();
        let g = small(&dag);
        assert_eq!(
            dag.topological_sort().unwrap(),
            vec![g.island, g.root, g.a1, g.a2, g.a3, g.b1, g.b2]
        );
    }

    #[test]
    fn critical_path_follows_the_heavy_branch() {
        let dag = setup();
        let n = nodes(&dag, 4);
        let (root, a, b, leaf) = (n[0], n[1], n[2], n[3]);
        for (p, c, w) in [(root, a, 10.0), (a, leaf, 10.0), (root, b, 1.0), (b, leaf, 1.0)] {
            dag.add_edge(NewEdge::new(p, c).weight(w), GuardOptions::default())
                .unwrap();
        }
        let heavy = dag.critical_path(Some("weight")).unwrap();
        assert_eq!(heavy.path.nodes, vec![root, a, leaf]);
        assert_eq!(heavy.total_weight, 20.0);

        let longest = dag.critical_path(None).unwrap();
        assert_eq!(longest.path.len(), 3);
        assert_eq!(longest.total_weight, 2.0);
    }

    #[test]
    fn critical_path_of_an_empty_graph_is_empty() {
        let dag = setup();
        let empty = dag.critical_path(None).unwrap();
        assert!(empty.path.is_empty());
        assert_eq!(empty.total_weight, 0.0);

        let lone = dag.add_node().unwrap();
        let single = dag.critical_path(None).unwrap();
        assert_eq!(single.path.nodes, vec![lone]);
        assert_eq!(single.total_weight, 0.0);
    }

    #[test]
    fn critical_path_rejects_text_fields() {
        let dag = setup();
        assert!(matches!(
            dag.critical_path(Some("attributes")),
            Err(DagError::InvalidWeightField { .. })
        ));
    }

    #[test]
    fn reduction_dry_run_then_apply() {
        let dag = setup();
        let n = diamond_with_shortcut(&dag);
        let dry = dag.transitive_reduction(false).unwrap();
        assert_eq!(
            dry.redundant.iter().map(Edge::pair).collect::<Vec<_>>(),
            vec![(n[0], n[3])]
        );
        assert_eq!(dry.deleted, 0);
        assert_eq!(dag.store().count_edges(&EdgePredicate::All).unwrap(), 5);

        let applied = dag.transitive_reduction(true).unwrap();
        assert_eq!(applied.deleted, 1);
        assert_eq!(dag.store().count_edges(&EdgePredicate::All).unwrap(), 4);
        assert!(dag.is_ancestor_of(n[0], n[3]).unwrap());
        assert!(dag.redundant_edges().unwrap().is_empty());
    }

    #[test]
    fn stats_summarise_the_graph() {
        let dag = setup();
        small(&dag);
        let stats = dag.graph_stats().unwrap();
        assert_eq!(stats.node_count, 7);
        assert_eq!(stats.edge_count, 6);
        assert_eq!(stats.root_count, 2);
        assert_eq!(stats.leaf_count, 3);
        assert_eq!(stats.island_count, 1);
        assert_eq!(stats.max_depth, 2);
        assert!((stats.avg_depth - 1.0).abs() < 1e-9);
        assert!((stats.density - 6.0 / 42.0).abs() < 1e-9);
        assert_eq!(stats.component_count, 2);
        assert_eq!(stats.to_json()["component_count"], 2);
    }

    #[test]
    fn stats_of_an_empty_graph() {
        let dag = setup();
        let stats = dag.graph_stats().unwrap();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.avg_depth, 0.0);
        assert_eq!(stats.density, 0.0);
        assert_eq!(stats.component_count, 0);
    }
}
