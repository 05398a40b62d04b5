//! Per-node operations: mutation through the guard, closures, relatives,
//! paths and predicates.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DagError, Result};
use crate::filter::FilterSpec;
use crate::graph::{dedup_ordered, AllPathsOptions, Dag, PathOptions, WeightedPathOptions};
use crate::guard::GuardOptions;
use crate::query::{
    AncestorQuery, ConnectedGraphQuery, DescendantQuery, LcaQuery, PathQuery, WeightedPathQuery,
};
use crate::store::{EdgePredicate, EdgeStore};
use crate::types::{Direction, Edge, NewEdge, NodeDepth, NodeId, PathResult, WeightedPath};

impl<S: EdgeStore> Dag<S> {
    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub fn add_node(&self) -> Result<NodeId> {
        self.store.insert_node(None, None)
    }

    /// Add a node with an explicit id, e.g. a caller-generated UUID.
    pub fn add_node_with_id(&self, id: NodeId) -> Result<NodeId> {
        self.store.insert_node(Some(id), None)
    }

    pub fn add_node_with_attributes(&self, attributes: &Value) -> Result<NodeId> {
        self.store.insert_node(None, Some(attributes))
    }

    /// Delete a node and every edge touching it.
    pub fn remove_node(&self, node: NodeId) -> Result<bool> {
        let removed = self.store.delete_node(node)?;
        if removed {
            info!(%node, "node removed");
        }
        Ok(removed)
    }

    pub fn node_exists(&self, node: NodeId) -> Result<bool> {
        self.store.node_exists(node)
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    pub fn add_child(&self, parent: NodeId, child: NodeId, options: GuardOptions) -> Result<Edge> {
        self.add_edge(NewEdge::new(parent, child), options)
    }

    pub fn add_parent(&self, child: NodeId, parent: NodeId, options: GuardOptions) -> Result<Edge> {
        self.add_edge(NewEdge::new(parent, child), options)
    }

    /// Store `edge` after the enabled guard checks pass.
    ///
    /// The checks and the insert share one write scope; a rejection stores
    /// nothing.
    pub fn add_edge(&self, edge: NewEdge, options: GuardOptions) -> Result<Edge> {
        let (parent, child) = edge.endpoints()?;
        self.store.atomically(|| {
            self.require_node(parent)?;
            self.require_node(child)?;
            self.guard().check(parent, child, &options)?;
            let stored = self.store.insert_edge(&edge)?;
            debug!(edge = stored.id, %parent, %child, "edge added");
            Ok(stored)
        })
    }

    /// Remove the edge to `child`, or to every child when `None`.
    ///
    /// With `delete_node` the detached children are deleted as well.
    /// Returns the number of edges removed.
    pub fn remove_child(&self, parent: NodeId, child: Option<NodeId>, delete_node: bool) -> Result<usize> {
        self.store.atomically(|| {
            let (predicate, detached) = match child {
                Some(child) => (EdgePredicate::Between { parent, child }, vec![child]),
                None => (EdgePredicate::ParentIs(parent), self.children(parent)?),
            };
            let removed = self.store.delete_edges(&predicate)?;
            if delete_node && removed > 0 {
                for node in detached {
                    self.store.delete_node(node)?;
                }
            }
            debug!(%parent, removed, "child edges removed");
            Ok(removed)
        })
    }

    /// Remove the edge from `parent`, or from every parent when `None`.
    pub fn remove_parent(&self, child: NodeId, parent: Option<NodeId>, delete_node: bool) -> Result<usize> {
        self.store.atomically(|| {
            let (predicate, detached) = match parent {
                Some(parent) => (EdgePredicate::Between { parent, child }, vec![parent]),
                None => (EdgePredicate::ChildIs(child), self.parents(child)?),
            };
            let removed = self.store.delete_edges(&predicate)?;
            if delete_node && removed > 0 {
                for node in detached {
                    self.store.delete_node(node)?;
                }
            }
            debug!(%child, removed, "parent edges removed");
            Ok(removed)
        })
    }

    // -----------------------------------------------------------------------
    // Closures
    // -----------------------------------------------------------------------

    /// Ancestors with the longest distance at which each was reached.
    pub fn ancestors_with_depth(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeDepth>> {
        self.store.run(&AncestorQuery::of(node).filter(self.bounded(filter)))
    }

    pub fn descendants_with_depth(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeDepth>> {
        self.store.run(&DescendantQuery::of(node).filter(self.bounded(filter)))
    }

    /// Ancestors, root-most first.
    pub fn ancestors(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        Ok(ids(self.ancestors_with_depth(node, filter)?))
    }

    pub fn ancestors_count(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<usize> {
        Ok(self.ancestors_with_depth(node, filter)?.len())
    }

    /// `node` followed by its ancestors, nearest first.
    pub fn self_and_ancestors(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let mut out = vec![node];
        out.extend(self.ancestors(node, filter)?.into_iter().rev());
        Ok(out)
    }

    /// Ancestors root-most first, then `node`.
    pub fn ancestors_and_self(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let mut out = self.ancestors(node, filter)?;
        out.push(node);
        Ok(out)
    }

    /// Descendants, nearest first.
    pub fn descendants(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        Ok(ids(self.descendants_with_depth(node, filter)?))
    }

    pub fn descendants_count(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<usize> {
        Ok(self.descendants_with_depth(node, filter)?.len())
    }

    /// `node` followed by its descendants, nearest first.
    pub fn self_and_descendants(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let mut out = vec![node];
        out.extend(self.descendants(node, filter)?);
        Ok(out)
    }

    /// Descendants deepest first, then `node`.
    pub fn descendants_and_self(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let mut out: Vec<NodeId> = self.descendants(node, filter)?.into_iter().rev().collect();
        out.push(node);
        Ok(out)
    }

    /// Ancestors, `node`, then descendants.
    pub fn clan(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let mut out = self.ancestors_and_self(node, filter)?;
        out.extend(self.descendants(node, filter)?);
        Ok(out)
    }

    pub fn clan_count(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<usize> {
        Ok(self.clan(node, filter)?.len())
    }

    // -----------------------------------------------------------------------
    // Relatives
    // -----------------------------------------------------------------------

    /// Direct parents by ascending id.
    pub fn parents(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let edges = self.store.fetch_edges(&EdgePredicate::ChildIs(node))?;
        Ok(sorted_unique(edges.iter().map(|e| e.parent)))
    }

    /// Direct children by ascending id.
    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let edges = self.store.fetch_edges(&EdgePredicate::ParentIs(node))?;
        Ok(sorted_unique(edges.iter().map(|e| e.child)))
    }

    /// Every node sharing a parent with `node`, `node` included. Empty for
    /// parentless nodes.
    pub fn siblings_with_self(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let parents = self.parents(node)?;
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let edges = self.store.fetch_edges(&EdgePredicate::FromNodes(parents))?;
        Ok(sorted_unique(edges.iter().map(|e| e.child)))
    }

    pub fn siblings(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let mut out = self.siblings_with_self(node)?;
        out.retain(|n| *n != node);
        Ok(out)
    }

    pub fn siblings_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.siblings(node)?.len())
    }

    /// Every node sharing a child with `node`, `node` included. Empty for
    /// childless nodes.
    pub fn partners_with_self(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let children = self.children(node)?;
        if children.is_empty() {
            return Ok(Vec::new());
        }
        let edges = self.store.fetch_edges(&EdgePredicate::IntoNodes(children))?;
        Ok(sorted_unique(edges.iter().map(|e| e.parent)))
    }

    pub fn partners(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let mut out = self.partners_with_self(node)?;
        out.retain(|n| *n != node);
        Ok(out)
    }

    pub fn partners_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.partners(node)?.len())
    }

    /// Ancestors with no parents of their own, or `[node]` when it has no
    /// ancestors.
    pub fn roots_of(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let ancestors = self.ancestors(node, filter)?;
        if ancestors.is_empty() {
            return Ok(vec![node]);
        }
        let with_parents: BTreeSet<NodeId> = self
            .store
            .fetch_edges(&EdgePredicate::IntoNodes(ancestors.clone()))?
            .iter()
            .map(|e| e.child)
            .collect();
        Ok(ancestors.into_iter().filter(|n| !with_parents.contains(n)).collect())
    }

    /// Descendants with no children of their own, or `[node]` when it has no
    /// descendants.
    pub fn leaves_of(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        let descendants = self.descendants(node, filter)?;
        if descendants.is_empty() {
            return Ok(vec![node]);
        }
        let with_children: BTreeSet<NodeId> = self
            .store
            .fetch_edges(&EdgePredicate::FromNodes(descendants.clone()))?
            .iter()
            .map(|e| e.parent)
            .collect();
        Ok(descendants.into_iter().filter(|n| !with_children.contains(n)).collect())
    }

    pub fn connected_graph(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<Vec<NodeId>> {
        self.store.run(&ConnectedGraphQuery::of(node).filter(self.bounded(filter)))
    }

    pub fn connected_graph_node_count(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<usize> {
        Ok(self.connected_graph(node, filter)?.len())
    }

    /// Lowest common ancestors of two nodes, each node counting as its own
    /// ancestor.
    pub fn lowest_common_ancestors(&self, first: NodeId, second: NodeId) -> Result<Vec<NodeId>> {
        self.store
            .run(&LcaQuery::of(first, second).filter(self.bounded(None)))
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    /// Shortest path from `start` to `end`.
    ///
    /// Searches downward; when `options.directional` is false and nothing is
    /// found, searches upward too.
    pub fn path(&self, start: NodeId, end: NodeId, options: &PathOptions) -> Result<PathResult> {
        if start == end {
            return Ok(PathResult::single(start));
        }
        let filter = self.bounded(Some(&options.filter));
        let mut found = self
            .store
            .run(&PathQuery::downward(start, end).filter(filter.clone()))?;
        if found.is_empty() && !options.directional {
            found = self.store.run(&PathQuery::upward(start, end).filter(filter))?;
        }
        found
            .into_iter()
            .next()
            .ok_or(DagError::NodeNotReachable { from: start, to: end })
    }

    pub fn path_exists(&self, start: NodeId, end: NodeId, options: &PathOptions) -> Result<bool> {
        match self.path(start, end, options) {
            Ok(_) => Ok(true),
            Err(DagError::NodeNotReachable { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Hop count of the shortest path.
    pub fn distance(&self, start: NodeId, end: NodeId, options: &PathOptions) -> Result<usize> {
        Ok(self.path(start, end, options)?.hops())
    }

    /// Every path from `start` to `end`, shortest first, up to the cap.
    ///
    /// Unreachable pairs give an empty list.
    pub fn all_paths(&self, start: NodeId, end: NodeId, options: &AllPathsOptions) -> Result<Vec<PathResult>> {
        if start == end {
            return Ok(vec![PathResult::single(start)]);
        }
        let cap = options.max_results.unwrap_or(self.config.max_paths);
        let filter = self.bounded(Some(&options.filter));
        let found = self
            .store
            .run(&PathQuery::downward(start, end).filter(filter.clone()).all(cap))?;
        if found.is_empty() && !options.directional {
            return self
                .store
                .run(&PathQuery::upward(start, end).filter(filter).all(cap));
        }
        Ok(found)
    }

    /// Minimum total weight path from `start` to `end`.
    pub fn weighted_path(&self, start: NodeId, end: NodeId, options: &WeightedPathOptions) -> Result<WeightedPath> {
        self.store.schema().validate_weight_field(&options.weight_field)?;
        if start == end {
            return Ok(WeightedPath {
                path: PathResult::single(start),
                total_weight: 0.0,
            });
        }
        let filter = self.bounded(Some(&options.filter));
        let query = |direction: Direction| {
            WeightedPathQuery::new(direction)
                .from(start)
                .to(end)
                .filter(filter.clone())
                .weight_field(&options.weight_field)
        };
        let mut found = self.store.run(&query(Direction::Downward))?;
        if found.is_none() && !options.directional {
            found = self.store.run(&query(Direction::Upward))?;
        }
        found.ok_or(DagError::NodeNotReachable { from: start, to: end })
    }

    pub fn weighted_distance(&self, start: NodeId, end: NodeId, options: &WeightedPathOptions) -> Result<f64> {
        Ok(self.weighted_path(start, end, options)?.total_weight)
    }

    // -----------------------------------------------------------------------
    // Predicates
    // -----------------------------------------------------------------------

    fn has_parents(&self, node: NodeId) -> Result<bool> {
        Ok(self.store.count_edges(&EdgePredicate::ChildIs(node))? > 0)
    }

    fn has_children(&self, node: NodeId) -> Result<bool> {
        Ok(self.store.count_edges(&EdgePredicate::ParentIs(node))? > 0)
    }

    /// Has children and no parents.
    pub fn is_root(&self, node: NodeId) -> Result<bool> {
        Ok(self.has_children(node)? && !self.has_parents(node)?)
    }

    /// Has parents and no children.
    pub fn is_leaf(&self, node: NodeId) -> Result<bool> {
        Ok(self.has_parents(node)? && !self.has_children(node)?)
    }

    pub fn is_island(&self, node: NodeId) -> Result<bool> {
        Ok(!self.has_parents(node)? && !self.has_children(node)?)
    }

    /// `node` reaches `other` by a downward path. A node is not its own
    /// ancestor.
    pub fn is_ancestor_of(&self, node: NodeId, other: NodeId) -> Result<bool> {
        if node == other {
            return Ok(false);
        }
        self.path_exists(node, other, &PathOptions::default())
    }

    pub fn is_descendant_of(&self, node: NodeId, other: NodeId) -> Result<bool> {
        self.is_ancestor_of(other, node)
    }

    pub fn is_sibling_of(&self, node: NodeId, other: NodeId) -> Result<bool> {
        Ok(self.siblings(node)?.contains(&other))
    }

    pub fn is_partner_of(&self, node: NodeId, other: NodeId) -> Result<bool> {
        Ok(self.partners(node)?.contains(&other))
    }

    /// Longest distance from `node` up to a root; 0 for roots and islands.
    pub fn node_depth(&self, node: NodeId) -> Result<u32> {
        Ok(self
            .ancestors_with_depth(node, None)?
            .iter()
            .map(|n| n.depth)
            .max()
            .unwrap_or(0))
    }
}

fn ids(depths: Vec<NodeDepth>) -> Vec<NodeId> {
    dedup_ordered(depths.into_iter().map(|n| n.id))
}

fn sorted_unique(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}
