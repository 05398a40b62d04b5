//! Nested ancestor and descendant trees.
//!
//! Each tree costs two statements: the closure traversal, then one edge
//! fetch restricted to the closure's node set and to the edges the filter
//! lets the walk cross. Nesting happens in memory.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::filter::FilterSpec;
use crate::graph::{walkable, Dag};
use crate::store::{EdgePredicate, EdgeStore};
use crate::types::{Direction, NodeId, TreeNode};

impl<S: EdgeStore> Dag<S> {
    /// `node` with its descendants nested under their parents.
    ///
    /// A node reachable through several parents appears under each of them.
    pub fn descendants_tree(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<TreeNode> {
        let descendants = self.descendants(node, filter)?;
        if descendants.is_empty() {
            return Ok(TreeNode::leaf(node));
        }
        let mut members = vec![node];
        members.extend(descendants);
        let links = self.links_within(&members, filter, Direction::Downward)?;
        Ok(nest(node, &links, &mut BTreeSet::new()))
    }

    /// `node` with its ancestors nested under their children.
    pub fn ancestors_tree(&self, node: NodeId, filter: Option<&FilterSpec>) -> Result<TreeNode> {
        let ancestors = self.ancestors(node, filter)?;
        if ancestors.is_empty() {
            return Ok(TreeNode::leaf(node));
        }
        let mut members = ancestors;
        members.push(node);
        let links = self.links_within(&members, filter, Direction::Upward)?;
        Ok(nest(node, &links, &mut BTreeSet::new()))
    }

    /// Adjacency over the walkable edges inside `members`, keyed by the node
    /// a step in `direction` leaves. Each list follows the order of `members`.
    fn links_within(
        &self,
        members: &[NodeId],
        filter: Option<&FilterSpec>,
        direction: Direction,
    ) -> Result<BTreeMap<NodeId, Vec<NodeId>>> {
        let position: BTreeMap<NodeId, usize> =
            members.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let predicate = walkable(
            EdgePredicate::WithinNodes(members.to_vec()),
            filter,
            Some(direction),
        );
        let edges = self.store.fetch_edges(&predicate)?;

        let mut links: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for edge in &edges {
            let (from, to) = match direction {
                Direction::Downward => (edge.parent, edge.child),
                Direction::Upward => (edge.child, edge.parent),
            };
            let next = links.entry(from).or_default();
            if !next.contains(&to) {
                next.push(to);
            }
        }
        for next in links.values_mut() {
            next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        }
        Ok(links)
    }
}

/// Build the subtree under `id`, skipping nodes already on the current branch.
fn nest(id: NodeId, links: &BTreeMap<NodeId, Vec<NodeId>>, on_branch: &mut BTreeSet<NodeId>) -> TreeNode {
    on_branch.insert(id);
    let next: Vec<NodeId> = match links.get(&id) {
        Some(next) => next.iter().filter(|n| !on_branch.contains(*n)).copied().collect(),
        None => Vec::new(),
    };
    let children = next
        .into_iter()
        .map(|child| nest(child, links, on_branch))
        .collect();
    on_branch.remove(&id);
    TreeNode { id, children }
}
