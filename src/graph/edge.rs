//! Edge-centric operations: edge sets around a node, route checks,
//! topological edge ordering and node splicing.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::error::{DagError, Result};
use crate::filter::FilterSpec;
use crate::graph::{walkable, Dag, PathOptions, SpliceOptions};
use crate::guard::GuardOptions;
use crate::store::{EdgePredicate, EdgeStore};
use crate::types::{Direction, Edge, EdgeId, NewEdge, NodeId, ScopeTag};

/// True when each edge's child is the next edge's parent.
pub fn validate_route(edges: &[Edge]) -> bool {
    edges.windows(2).all(|pair| pair[0].child == pair[1].parent)
}

/// Sort `edges` by the position of their endpoints in `order`, parent first.
fn order_by_position(mut edges: Vec<Edge>, order: &[NodeId]) -> Vec<Edge> {
    let position: BTreeMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let at = |id: &NodeId| position.get(id).copied().unwrap_or(usize::MAX);
    edges.sort_by_key(|e| (at(&e.parent), at(&e.child), e.id));
    edges
}

impl<S: EdgeStore> Dag<S> {
    /// Edges with both endpoints in `nodes`, by edge id.
    pub fn edges_within(&self, nodes: &[NodeId]) -> Result<Vec<Edge>> {
        self.store
            .fetch_edges(&EdgePredicate::WithinNodes(nodes.to_vec()))
    }

    /// Edges leaving `node` or any of its descendants that the filter lets
    /// a downward walk cross.
    pub fn edges_below(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<Edge>> {
        let order = self.self_and_descendants(node, filter)?;
        let predicate = walkable(
            EdgePredicate::FromNodes(order.clone()),
            filter,
            Some(Direction::Downward),
        );
        Ok(order_by_position(self.store.fetch_edges(&predicate)?, &order))
    }

    /// Edges entering `node` or any of its ancestors that the filter lets
    /// an upward walk cross.
    pub fn edges_above(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<Edge>> {
        let order = self.ancestors_and_self(node, filter)?;
        let predicate = walkable(
            EdgePredicate::IntoNodes(order.clone()),
            filter,
            Some(Direction::Upward),
        );
        Ok(order_by_position(self.store.fetch_edges(&predicate)?, &order))
    }

    /// Edges with both endpoints in the clan of `node` and passing the
    /// filter's edge hooks.
    pub fn edges_of_clan(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<Edge>> {
        let order = self.clan(node, filter)?;
        self.walkable_within(&order, filter, None)
    }

    /// The edges walked by the shortest path, root side first.
    ///
    /// Where several edges the filter admits join the same pair, the oldest
    /// is used.
    pub fn edges_along_path(&self, start: NodeId, end: NodeId, options: &PathOptions) -> Result<Vec<Edge>> {
        let nodes = self.path(start, end, options)?.root_to_leaf();
        let predicate = walkable(
            EdgePredicate::WithinNodes(nodes.clone()),
            Some(&options.filter),
            None,
        );
        let mut by_pair: BTreeMap<(NodeId, NodeId), Edge> = BTreeMap::new();
        for edge in self.store.fetch_edges(&predicate)? {
            by_pair.entry(edge.pair()).or_insert(edge);
        }
        nodes
            .windows(2)
            .map(|pair| {
                by_pair.remove(&(pair[0], pair[1])).ok_or_else(|| {
                    DagError::UnrecognizedGraphEntity(format!(
                        "no edge from {} to {} along the path",
                        pair[0], pair[1]
                    ))
                })
            })
            .collect()
    }

    /// Edges the filtered descendant walk from `node` can cross, root side
    /// first.
    pub fn descendants_edges(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<Edge>> {
        let order = self.self_and_descendants(node, filter)?;
        self.walkable_within(&order, filter, Some(Direction::Downward))
    }

    /// Edges the filtered ancestor walk from `node` can cross, root side
    /// first.
    pub fn ancestors_edges(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<Edge>> {
        let order = self.ancestors_and_self(node, filter)?;
        self.walkable_within(&order, filter, Some(Direction::Upward))
    }

    fn walkable_within(
        &self,
        order: &[NodeId],
        filter: Option<&FilterSpec>,
        reached: Option<Direction>,
    ) -> Result<Vec<Edge>> {
        let predicate = walkable(EdgePredicate::WithinNodes(order.to_vec()), filter, reached);
        Ok(order_by_position(self.store.fetch_edges(&predicate)?, order))
    }

    /// Ancestor and descendant edges of `node` together, root side first.
    pub fn clan_edges(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<Edge>> {
        let mut seen = BTreeSet::new();
        let edges: Vec<Edge> = self
            .ancestors_edges(node, filter)?
            .into_iter()
            .chain(self.descendants_edges(node, filter)?)
            .filter(|e| seen.insert(e.id))
            .collect();
        let order = self.clan(node, filter)?;
        Ok(order_by_position(edges, &order))
    }

    /// Sort edges root side first by the depth of their parent, then of
    /// their child.
    pub fn sort_edges(&self, mut edges: Vec<Edge>) -> Result<Vec<Edge>> {
        if edges.len() < 2 {
            return Ok(edges);
        }
        let depths: BTreeMap<NodeId, u32> = self
            .layered()?
            .into_iter()
            .map(|n| (n.id, n.depth))
            .collect();
        let depth = |id: &NodeId| depths.get(id).copied().unwrap_or(0);
        edges.sort_by_key(|e| (depth(&e.parent), depth(&e.child)));
        Ok(edges)
    }

    /// Replace edge `edge_id` with `parent -> node -> child`.
    ///
    /// Returns the new root-side and leaf-side edges. Both inserts pass the
    /// cycle check, and the original edge is deleted in the same write
    /// scope.
    pub fn insert_node(&self, edge_id: EdgeId, node: NodeId, options: SpliceOptions) -> Result<(Edge, Edge)> {
        self.store.atomically(|| {
            let original = self
                .store
                .fetch_edges(&EdgePredicate::Ids(vec![edge_id]))?
                .into_iter()
                .next()
                .ok_or_else(|| DagError::UnrecognizedGraphEntity(format!("edge {edge_id} does not exist")))?;
            self.require_node(node)?;
            let (parent, child) = original.pair();

            let rootside = if options.clone_to_rootside {
                NewEdge::cloned_from(&original, parent, node)
            } else {
                NewEdge::new(parent, node)
            };
            let leafside = if options.clone_to_leafside {
                NewEdge::cloned_from(&original, node, child)
            } else {
                NewEdge::new(node, child)
            };

            let rootside = self.add_edge(rootside, GuardOptions::default())?;
            let leafside = self.add_edge(leafside, GuardOptions::default())?;
            self.store.delete_edges(&EdgePredicate::Ids(vec![edge_id]))?;
            info!(edge = edge_id, %node, %parent, %child, "node spliced into edge");
            Ok((rootside, leafside))
        })
    }

    /// Find or create the edge scope called `name`.
    pub fn create_scope(&self, name: &str) -> Result<ScopeTag> {
        self.store.create_scope(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::{link, nodes, setup, small};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pairs(edges: &[Edge]) -> Vec<(NodeId, NodeId)> {
        edges.iter().map(Edge::pair).collect()
    }

    #[test]
    fn descendant_edges_are_root_side_first() {
        let dag = setup();
        let g = small(&dag);
        let edges = dag.descendants_edges(g.root, None).unwrap();
        assert_eq!(
            pairs(&edges),
            vec![
                (g.root, g.a1),
                (g.root, g.a2),
                (g.root, g.a3),
                (g.a1, g.b1),
                (g.a2, g.b1),
                (g.a3, g.b2),
            ]
        );
    }

    #[test]
    fn clan_edges_cover_both_directions() {
        let dag = setup();
        let g = small(&dag);
        let edges = pairs(&dag.clan_edges(g.a1, None).unwrap());
        assert_eq!(edges, vec![(g.root, g.a1), (g.a1, g.b1)]);
        assert_eq!(pairs(&dag.ancestors_edges(g.b1, None).unwrap()).len(), 4);
    }

    #[test]
    fn edges_above_and_below() {
        let dag = setup();
        let g = small(&dag);
        assert_eq!(
            pairs(&dag.edges_above(g.b2, None).unwrap()),
            vec![(g.root, g.a3), (g.a3, g.b2)]
        );
        assert_eq!(
            pairs(&dag.edges_below(g.a2, None).unwrap()),
            vec![(g.a2, g.b1)]
        );
        assert_eq!(dag.edges_of_clan(g.a3, None).unwrap().len(), 2);
        assert_eq!(dag.edges_within(&[g.a1, g.b1, g.b2]).unwrap().len(), 1);
    }

    /// `a -> b -> c` plus the shortcut `a -> c`, returned as
    /// `(nodes, [ab, ac, bc])`.
    fn shortcut(dag: &Dag<crate::store::SqliteStore>) -> (Vec<NodeId>, Vec<Edge>) {
        let n = nodes(dag, 3);
        let edges = [(0, 1), (0, 2), (1, 2)]
            .into_iter()
            .map(|(p, c)| dag.add_child(n[p], n[c], GuardOptions::default()).unwrap())
            .collect();
        (n, edges)
    }

    #[test]
    fn edge_sets_drop_edges_the_filter_cuts() {
        let dag = setup();
        let (n, e) = shortcut(&dag);
        let cut = FilterSpec::new().disallow_edges([e[1].id]);

        let below = dag.descendants_edges(n[0], Some(&cut)).unwrap();
        assert_eq!(below, vec![e[0].clone(), e[2].clone()]);
        let above = dag.ancestors_edges(n[2], Some(&cut)).unwrap();
        assert_eq!(above, vec![e[0].clone(), e[2].clone()]);
        assert_eq!(dag.edges_below(n[0], Some(&cut)).unwrap().len(), 2);
        assert_eq!(dag.clan_edges(n[1], Some(&cut)).unwrap().len(), 2);
        assert_eq!(dag.descendants_edges(n[0], None).unwrap().len(), 3);
    }

    #[test]
    fn path_edges_skip_a_parallel_edge_the_filter_cuts() {
        let dag = setup();
        let n = nodes(&dag, 2);
        let older = dag.add_child(n[0], n[1], GuardOptions::default()).unwrap();
        let newer = dag.add_child(n[0], n[1], GuardOptions::default()).unwrap();
        let options = PathOptions::new().filter(FilterSpec::new().disallow_edges([older.id]));
        assert_eq!(dag.edges_along_path(n[0], n[1], &options).unwrap(), vec![newer]);
        assert_eq!(
            dag.edges_along_path(n[0], n[1], &PathOptions::default()).unwrap(),
            vec![older]
        );
    }

    #[test]
    fn edge_sets_keep_only_the_scoped_edges() {
        let dag = setup();
        let n = nodes(&dag, 3);
        let road = dag.create_scope("road").unwrap();
        let rail = dag.create_scope("rail").unwrap();
        let kept = dag
            .add_edge(NewEdge::new(n[0], n[1]).scope(road), GuardOptions::default())
            .unwrap();
        dag.add_edge(NewEdge::new(n[1], n[2]).scope(rail), GuardOptions::default())
            .unwrap();
        dag.add_edge(NewEdge::new(n[0], n[2]).scope(rail), GuardOptions::default())
            .unwrap();

        let roads = FilterSpec::new().edge_scope(road);
        assert_eq!(dag.edges_below(n[0], Some(&roads)).unwrap(), vec![kept.clone()]);
        assert_eq!(dag.edges_of_clan(n[1], Some(&roads)).unwrap(), vec![kept]);
    }

    #[test]
    fn edges_along_path_follow_the_route() {
        let dag = setup();
        let g = small(&dag);
        let edges = dag.edges_along_path(g.root, g.b2, &PathOptions::default()).unwrap();
        assert_eq!(pairs(&edges), vec![(g.root, g.a3), (g.a3, g.b2)]);
        assert!(validate_route(&edges));

        let up = dag
            .edges_along_path(g.b2, g.root, &PathOptions::new().undirected())
            .unwrap();
        assert_eq!(pairs(&up), vec![(g.root, g.a3), (g.a3, g.b2)]);
    }

    #[test]
    fn route_validation() {
        let dag = setup();
        let g = small(&dag);
        let edges = dag.descendants_edges(g.root, None).unwrap();
        assert!(!validate_route(&edges));
        assert!(validate_route(&edges[..1]));
        assert!(validate_route(&[]));
    }

    #[test]
    fn sort_edges_orders_by_depth() {
        let dag = setup();
        let g = small(&dag);
        let mut edges = dag.descendants_edges(g.root, None).unwrap();
        edges.reverse();
        let sorted = dag.sort_edges(edges).unwrap();
        let depths: Vec<u32> = sorted
            .iter()
            .map(|e| dag.node_depth(e.parent).unwrap())
            .collect();
        assert_eq!(depths, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn insert_node_splices_and_deletes_the_original() {
        let dag = setup();
        let n = nodes(&dag, 3);
        let original = dag
            .add_edge(
                NewEdge::new(n[0], n[2]).weight(4.0).attributes(json!({"k": 1})),
                GuardOptions::default(),
            )
            .unwrap();
        let (rootside, leafside) = dag
            .insert_node(
                original.id,
                n[1],
                SpliceOptions {
                    clone_to_rootside: true,
                    clone_to_leafside: false,
                },
            )
            .unwrap();
        assert_eq!(rootside.pair(), (n[0], n[1]));
        assert_eq!(rootside.weight, Some(4.0));
        assert_eq!(rootside.attributes, Some(json!({"k": 1})));
        assert_eq!(leafside.pair(), (n[1], n[2]));
        assert_eq!(leafside.weight, None);
        assert!(dag.edges_within(&[n[0], n[2]]).unwrap().is_empty());
        assert_eq!(dag.descendants(n[0], None).unwrap(), vec![n[1], n[2]]);
    }

    #[test]
    fn insert_node_rejecting_a_cycle_keeps_the_original() {
        let dag = setup();
        let n = nodes(&dag, 3);
        link(&dag, n[0], n[1]);
        link(&dag, n[1], n[2]);
        let edge = dag.edges_within(&[n[1], n[2]]).unwrap().remove(0);
        let err = dag
            .insert_node(edge.id, n[0], SpliceOptions::default())
            .unwrap_err();
        assert!(matches!(err, DagError::CyclicEdgeRejected { .. }));
        assert_eq!(dag.edges_within(&n).unwrap().len(), 2);
    }

    #[test]
    fn insert_node_into_missing_edge() {
        let dag = setup();
        let n = dag.add_node().unwrap();
        assert!(matches!(
            dag.insert_node(77, n, SpliceOptions::default()),
            Err(DagError::UnrecognizedGraphEntity(_))
        ));
    }

    #[test]
    fn edge_scope_filters_traversals() {
        let dag = setup();
        let n = nodes(&dag, 3);
        let power = dag.create_scope("power").unwrap();
        let water = dag.create_scope("water").unwrap();
        assert_eq!(dag.create_scope("power").unwrap(), power);
        dag.add_edge(NewEdge::new(n[0], n[1]).scope(power), GuardOptions::default())
            .unwrap();
        dag.add_edge(NewEdge::new(n[1], n[2]).scope(water), GuardOptions::default())
            .unwrap();
        let only_power = FilterSpec::new().edge_scope(power);
        assert_eq!(dag.descendants(n[0], Some(&only_power)).unwrap(), vec![n[1]]);
        assert_eq!(dag.descendants(n[0], None).unwrap(), vec![n[1], n[2]]);
    }
}
