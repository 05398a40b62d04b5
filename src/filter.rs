//! Traversal filters.
//!
//! A [`FilterSpec`] is an immutable value describing which nodes and edges a
//! traversal may use. Builders turn it into predicates through six hooks,
//! always in the order of [`FilterKind::HOOK_ORDER`]. Whether a given hook
//! does anything depends on the traversal kind; see
//! [`QueryKind::supported_filters`](crate::query::QueryKind::supported_filters).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{EdgeId, IdKind, NodeId, ScopeTag};

// ---------------------------------------------------------------------------
// FilterKind
// ---------------------------------------------------------------------------

/// One composition hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Limit to nodes belonging to a scope. Nodes carry no scope column, so
    /// no traversal honours this hook.
    NodeScope,
    /// Limit to edges tagged with a scope.
    EdgeScope,
    DisallowNodes,
    DisallowEdges,
    AllowNodes,
    AllowEdges,
}

impl FilterKind {
    /// Fixed order in which hooks are applied.
    pub const HOOK_ORDER: [FilterKind; 6] = [
        Self::NodeScope,
        Self::EdgeScope,
        Self::DisallowNodes,
        Self::DisallowEdges,
        Self::AllowNodes,
        Self::AllowEdges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeScope => "node_scope",
            Self::EdgeScope => "edge_scope",
            Self::DisallowNodes => "disallow_nodes",
            Self::DisallowEdges => "disallow_edges",
            Self::AllowNodes => "allow_nodes",
            Self::AllowEdges => "allow_edges",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FilterSpec
// ---------------------------------------------------------------------------

/// Optional restrictions for one traversal call. An unset field means "no
/// restriction".
///
/// Built with consuming setters and read through getters; a spec is never
/// changed once handed to a builder.
///
/// ```
/// use dagstore::filter::FilterSpec;
///
/// let filter = FilterSpec::new().disallow_nodes([3_i64, 4]).max_depth(5);
/// assert_eq!(filter.max_depth_bound(), Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    node_scope: Option<ScopeTag>,
    edge_scope: Option<ScopeTag>,
    disallowed_nodes: Option<BTreeSet<NodeId>>,
    disallowed_edges: Option<BTreeSet<EdgeId>>,
    allowed_nodes: Option<BTreeSet<NodeId>>,
    allowed_edges: Option<BTreeSet<EdgeId>>,
    max_depth: Option<u32>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_scope(mut self, tag: ScopeTag) -> Self {
        self.node_scope = Some(tag);
        self
    }

    pub fn edge_scope(mut self, tag: ScopeTag) -> Self {
        self.edge_scope = Some(tag);
        self
    }

    pub fn disallow_nodes<I, N>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        self.disallowed_nodes = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn disallow_edges(mut self, ids: impl IntoIterator<Item = EdgeId>) -> Self {
        self.disallowed_edges = Some(ids.into_iter().collect());
        self
    }

    pub fn allow_nodes<I, N>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        self.allowed_nodes = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn allow_edges(mut self, ids: impl IntoIterator<Item = EdgeId>) -> Self {
        self.allowed_edges = Some(ids.into_iter().collect());
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Copy of this spec with `depth` filled in when no bound is set.
    pub fn or_max_depth(&self, depth: u32) -> Self {
        let mut spec = self.clone();
        spec.max_depth.get_or_insert(depth);
        spec
    }

    // -- getters ----------------------------------------------------------

    pub fn node_scope_tag(&self) -> Option<ScopeTag> {
        self.node_scope
    }

    pub fn edge_scope_tag(&self) -> Option<ScopeTag> {
        self.edge_scope
    }

    pub fn disallowed_nodes(&self) -> Option<&BTreeSet<NodeId>> {
        self.disallowed_nodes.as_ref()
    }

    pub fn disallowed_edges(&self) -> Option<&BTreeSet<EdgeId>> {
        self.disallowed_edges.as_ref()
    }

    pub fn allowed_nodes(&self) -> Option<&BTreeSet<NodeId>> {
        self.allowed_nodes.as_ref()
    }

    pub fn allowed_edges(&self) -> Option<&BTreeSet<EdgeId>> {
        self.allowed_edges.as_ref()
    }

    pub fn max_depth_bound(&self) -> Option<u32> {
        self.max_depth
    }

    /// Whether the hook `kind` has something to apply.
    pub fn is_set(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::NodeScope => self.node_scope.is_some(),
            FilterKind::EdgeScope => self.edge_scope.is_some(),
            FilterKind::DisallowNodes => self.disallowed_nodes.is_some(),
            FilterKind::DisallowEdges => self.disallowed_edges.is_some(),
            FilterKind::AllowNodes => self.allowed_nodes.is_some(),
            FilterKind::AllowEdges => self.allowed_edges.is_some(),
        }
    }

    /// Set hooks, in hook order.
    pub fn active_kinds(&self) -> Vec<FilterKind> {
        FilterKind::HOOK_ORDER
            .into_iter()
            .filter(|k| self.is_set(*k))
            .collect()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.active_kinds().is_empty() && self.max_depth.is_none()
    }

    /// Check every node id against the schema's id kind.
    pub fn check_ids(&self, kind: IdKind) -> Result<()> {
        let sets = [self.disallowed_nodes.as_ref(), self.allowed_nodes.as_ref()];
        for id in sets.into_iter().flatten().flatten() {
            kind.check(*id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DagError;

    #[test]
    fn empty_spec_is_unrestricted() {
        let spec = FilterSpec::new();
        assert!(spec.is_unrestricted());
        assert!(spec.active_kinds().is_empty());
    }

    #[test]
    fn active_kinds_follow_hook_order() {
        let spec = FilterSpec::new()
            .allow_edges([4])
            .disallow_nodes([1_i64])
            .edge_scope(ScopeTag(9))
            .node_scope(ScopeTag(2));
        assert_eq!(
            spec.active_kinds(),
            vec![
                FilterKind::NodeScope,
                FilterKind::EdgeScope,
                FilterKind::DisallowNodes,
                FilterKind::AllowEdges,
            ]
        );
    }

    #[test]
    fn or_max_depth_keeps_an_explicit_bound() {
        let explicit = FilterSpec::new().max_depth(3);
        assert_eq!(explicit.or_max_depth(20).max_depth_bound(), Some(3));
        assert_eq!(FilterSpec::new().or_max_depth(20).max_depth_bound(), Some(20));
        // the original value is untouched
        assert_eq!(explicit.max_depth_bound(), Some(3));
    }

    #[test]
    fn empty_allow_list_still_counts_as_set() {
        let spec = FilterSpec::new().allow_nodes(Vec::<NodeId>::new());
        assert!(spec.is_set(FilterKind::AllowNodes));
    }

    #[test]
    fn check_ids_flags_foreign_ids() {
        let spec = FilterSpec::new().disallow_nodes([NodeId::new_uuid()]);
        assert!(matches!(
            spec.check_ids(IdKind::BigInteger),
            Err(DagError::UnrecognizedGraphEntity(_))
        ));
        assert!(spec.check_ids(IdKind::Uuid).is_ok());
    }
}
