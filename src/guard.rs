//! Insert-time integrity checks for edges.
//!
//! Each check is a read query through the store. The facade runs the checks
//! and the insert inside one [`EdgeStore::atomically`] scope, so a rejection
//! leaves nothing behind and two writers cannot both pass a check that their
//! combined inserts would invalidate.

use serde::{Deserialize, Serialize};

use crate::error::{DagError, Result};
use crate::filter::FilterSpec;
use crate::query::{AncestorQuery, DescendantQuery, DEFAULT_MAX_DEPTH};
use crate::store::{EdgePredicate, EdgeStore};
use crate::types::NodeId;

/// Which checks run before an edge is stored.
///
/// The default rejects cycles and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardOptions {
    #[serde(default = "enabled")]
    pub check_circular: bool,
    #[serde(default = "enabled")]
    pub allow_duplicate_edges: bool,
    #[serde(default = "enabled")]
    pub allow_redundant_edges: bool,
}

fn enabled() -> bool {
    true
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            check_circular: true,
            allow_duplicate_edges: true,
            allow_redundant_edges: true,
        }
    }
}

impl GuardOptions {
    /// Every check on.
    pub fn strict() -> Self {
        Self {
            check_circular: true,
            allow_duplicate_edges: false,
            allow_redundant_edges: false,
        }
    }

    /// Every check off. The caller vouches for acyclicity.
    pub fn unchecked() -> Self {
        Self {
            check_circular: false,
            allow_duplicate_edges: true,
            allow_redundant_edges: true,
        }
    }

    pub fn disable_circular_check(mut self) -> Self {
        self.check_circular = false;
        self
    }

    pub fn forbid_duplicate_edges(mut self) -> Self {
        self.allow_duplicate_edges = false;
        self
    }

    pub fn forbid_redundant_edges(mut self) -> Self {
        self.allow_redundant_edges = false;
        self
    }
}

/// Runs the edge checks against one store.
#[derive(Debug)]
pub struct MutationGuard<'a, S: EdgeStore> {
    store: &'a S,
    max_depth: u32,
}

impl<'a, S: EdgeStore> MutationGuard<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Depth bound for the reachability checks.
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn check_filter(&self) -> FilterSpec {
        FilterSpec::new().max_depth(self.max_depth)
    }

    /// Run the enabled checks in order: circular, duplicate, redundant.
    pub fn check(&self, parent: NodeId, child: NodeId, options: &GuardOptions) -> Result<()> {
        let outcome = self.run_checks(parent, child, options);
        if let Err(err) = &outcome {
            tracing::debug!(%parent, %child, error = %err, "edge rejected by guard");
        }
        outcome
    }

    fn run_checks(&self, parent: NodeId, child: NodeId, options: &GuardOptions) -> Result<()> {
        if options.check_circular {
            self.circular_checker(parent, child)?;
        }
        if !options.allow_duplicate_edges {
            self.duplicate_edge_checker(parent, child)?;
        }
        if !options.allow_redundant_edges {
            self.redundant_edge_checker(parent, child)?;
        }
        Ok(())
    }

    /// Fails when `child` is `parent` or one of its ancestors.
    pub fn circular_checker(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let cyclic = parent == child
            || self
                .store
                .run(&AncestorQuery::of(parent).filter(self.check_filter()))?
                .iter()
                .any(|n| n.id == child);
        if cyclic {
            return Err(DagError::CyclicEdgeRejected { parent, child });
        }
        Ok(())
    }

    /// Fails when an edge with exactly this pair exists.
    pub fn duplicate_edge_checker(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if self
            .store
            .count_edges(&EdgePredicate::Between { parent, child })?
            > 0
        {
            return Err(DagError::DuplicateEdgeRejected { parent, child });
        }
        Ok(())
    }

    /// Fails when `child` is already reachable from `parent`.
    pub fn redundant_edge_checker(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let reachable = self
            .store
            .run(&DescendantQuery::of(parent).filter(self.check_filter()))?
            .iter()
            .any(|n| n.id == child);
        if reachable {
            return Err(DagError::RedundantEdgeRejected { parent, child });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::descriptor::GraphSchema;
    use crate::store::SqliteStore;
    use crate::types::NewEdge;

    /// Chain a -> b -> c.
    fn chain() -> (SqliteStore, NodeId, NodeId, NodeId) {
        let store = SqliteStore::in_memory(GraphSchema::default()).unwrap();
        let a = store.insert_node(None, None).unwrap();
        let b = store.insert_node(None, None).unwrap();
        let c = store.insert_node(None, None).unwrap();
        store.insert_edge(&NewEdge::new(a, b)).unwrap();
        store.insert_edge(&NewEdge::new(b, c)).unwrap();
        (store, a, b, c)
    }

    #[test]
    fn circular_checker_rejects_back_edges_and_self_loops() {
        let (store, a, b, c) = chain();
        let guard = MutationGuard::new(&store);
        assert!(matches!(
            guard.circular_checker(c, a),
            Err(DagError::CyclicEdgeRejected { .. })
        ));
        assert!(matches!(
            guard.circular_checker(b, b),
            Err(DagError::CyclicEdgeRejected { .. })
        ));
        assert!(guard.circular_checker(a, c).is_ok());
    }

    #[test]
    fn duplicate_checker_matches_exact_pairs_only() {
        let (store, a, b, c) = chain();
        let guard = MutationGuard::new(&store);
        assert!(matches!(
            guard.duplicate_edge_checker(a, b),
            Err(DagError::DuplicateEdgeRejected { .. })
        ));
        assert!(guard.duplicate_edge_checker(a, c).is_ok());
    }

    #[test]
    fn redundant_checker_uses_reachability() {
        let (store, a, _b, c) = chain();
        let guard = MutationGuard::new(&store);
        assert!(matches!(
            guard.redundant_edge_checker(a, c),
            Err(DagError::RedundantEdgeRejected { .. })
        ));
        assert!(guard.redundant_edge_checker(c, a).is_ok());
    }

    #[test]
    fn duplicate_is_reported_before_redundant() {
        let (store, a, b, _c) = chain();
        let err = MutationGuard::new(&store)
            .check(a, b, &GuardOptions::strict())
            .unwrap_err();
        assert!(matches!(err, DagError::DuplicateEdgeRejected { .. }));
    }

    #[test]
    fn default_options_only_check_cycles() {
        let (store, a, b, c) = chain();
        let guard = MutationGuard::new(&store);
        assert!(guard.check(a, b, &GuardOptions::default()).is_ok());
        assert!(guard.check(a, c, &GuardOptions::default()).is_ok());
        assert!(guard.check(c, a, &GuardOptions::unchecked()).is_ok());
    }
}
