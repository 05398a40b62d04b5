//! Traversal query construction.
//!
//! Every traversal kind has a builder that compiles an anchor (or two) plus a
//! [`FilterSpec`](crate::filter::FilterSpec) into one bounded recursive CTE.
//! Builders produce a [`CompiledQuery`]; a storage adapter executes it and
//! hands the raw rows back to the builder for decoding.

pub mod ancestry;
pub mod connected;
pub mod graphwide;
pub mod lca;
pub mod paths;
pub mod predicate;

use std::fmt;

use serde::Serialize;

use crate::db::descriptor::GraphSchema;
use crate::error::{DagError, Result};
use crate::filter::FilterKind;
use crate::types::{IdKind, NodeId, SqlValue};

pub use ancestry::{AncestorQuery, DescendantQuery};
pub use connected::ConnectedGraphQuery;
pub use graphwide::{CriticalPathQuery, TopologicalSortQuery, TransitiveReductionQuery};
pub use lca::LcaQuery;
pub use paths::{PathQuery, WeightedPathQuery};

/// Depth bound used when neither the filter nor the config supplies one.
pub const DEFAULT_MAX_DEPTH: u32 = 20;

// ---------------------------------------------------------------------------
// QueryKind
// ---------------------------------------------------------------------------

/// Every traversal the engine can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Ancestors,
    Descendants,
    ConnectedGraph,
    DownwardPath,
    UpwardPath,
    AllDownwardPaths,
    AllUpwardPaths,
    WeightedDownwardPath,
    WeightedUpwardPath,
    LowestCommonAncestors,
    TopologicalSort,
    CriticalPath,
    TransitiveReduction,
}

/// Hooks honoured by the directed and undirected walks.
const WALK_FILTERS: &[FilterKind] = &[
    FilterKind::EdgeScope,
    FilterKind::DisallowNodes,
    FilterKind::DisallowEdges,
    FilterKind::AllowNodes,
    FilterKind::AllowEdges,
];

impl QueryKind {
    pub const ALL: [QueryKind; 13] = [
        Self::Ancestors,
        Self::Descendants,
        Self::ConnectedGraph,
        Self::DownwardPath,
        Self::UpwardPath,
        Self::AllDownwardPaths,
        Self::AllUpwardPaths,
        Self::WeightedDownwardPath,
        Self::WeightedUpwardPath,
        Self::LowestCommonAncestors,
        Self::TopologicalSort,
        Self::CriticalPath,
        Self::TransitiveReduction,
    ];

    /// Filter hooks this traversal applies.
    ///
    /// - `NodeScope` is honoured by none: nodes have no scope column.
    /// - LCA intersects two unfiltered closures; a filter would change which
    ///   ancestor is lowest, so it takes none.
    /// - Topological sort, critical path and transitive reduction are
    ///   graph-wide and take none.
    ///
    /// `max_depth` is not a hook and bounds every kind.
    pub fn supported_filters(&self) -> &'static [FilterKind] {
        match self {
            Self::Ancestors
            | Self::Descendants
            | Self::ConnectedGraph
            | Self::DownwardPath
            | Self::UpwardPath
            | Self::AllDownwardPaths
            | Self::AllUpwardPaths
            | Self::WeightedDownwardPath
            | Self::WeightedUpwardPath => WALK_FILTERS,
            Self::LowestCommonAncestors
            | Self::TopologicalSort
            | Self::CriticalPath
            | Self::TransitiveReduction => &[],
        }
    }

    pub fn supports(&self, kind: FilterKind) -> bool {
        self.supported_filters().contains(&kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ancestors => "ancestors",
            Self::Descendants => "descendants",
            Self::ConnectedGraph => "connected_graph",
            Self::DownwardPath => "downward_path",
            Self::UpwardPath => "upward_path",
            Self::AllDownwardPaths => "all_downward_paths",
            Self::AllUpwardPaths => "all_upward_paths",
            Self::WeightedDownwardPath => "weighted_downward_path",
            Self::WeightedUpwardPath => "weighted_upward_path",
            Self::LowestCommonAncestors => "lowest_common_ancestors",
            Self::TopologicalSort => "topological_sort",
            Self::CriticalPath => "critical_path",
            Self::TransitiveReduction => "transitive_reduction",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CompiledQuery
// ---------------------------------------------------------------------------

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub kind: QueryKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Hooks that were set on the filter but not applied by this kind.
    pub ignored: Vec<FilterKind>,
}

impl CompiledQuery {
    pub(crate) fn new(
        kind: QueryKind,
        sql: String,
        params: Vec<SqlValue>,
        ignored: Vec<FilterKind>,
    ) -> Self {
        if !ignored.is_empty() {
            let names: Vec<&str> = ignored.iter().map(FilterKind::as_str).collect();
            tracing::warn!(query = %kind, ignored = ?names, "filters not supported by this traversal were skipped");
        }
        tracing::debug!(query = %kind, sql_len = sql.len(), params = params.len(), "compiled traversal");
        Self {
            kind,
            sql,
            params,
            ignored,
        }
    }
}

/// Raw result rows as returned by a storage adapter.
pub type Rows = Vec<Vec<SqlValue>>;

// ---------------------------------------------------------------------------
// TraversalQuery
// ---------------------------------------------------------------------------

/// A builder that compiles to SQL and decodes its own result rows.
pub trait TraversalQuery {
    type Output;

    fn kind(&self) -> QueryKind;

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery>;

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Unwrap a required anchor, checking it against the id kind.
pub(crate) fn require_anchor(
    anchor: Option<NodeId>,
    what: &str,
    kind: QueryKind,
    id_kind: IdKind,
) -> Result<NodeId> {
    let id = anchor.ok_or_else(|| {
        DagError::MisconfiguredQuery(format!("{kind} query needs a {what} node"))
    })?;
    id_kind.check(id)
}

/// Cell `index` of `row`, or an error naming the query.
pub(crate) fn cell(row: &[SqlValue], index: usize) -> Result<&SqlValue> {
    row.get(index).ok_or_else(|| {
        DagError::UnrecognizedGraphEntity(format!("result row has no column {index}"))
    })
}

pub(crate) fn cell_u32(row: &[SqlValue], index: usize) -> Result<u32> {
    cell(row, index)?
        .as_i64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| DagError::UnrecognizedGraphEntity(format!("column {index} is not a depth")))
}

pub(crate) fn cell_f64(row: &[SqlValue], index: usize) -> Result<f64> {
    let value = cell(row, index)?;
    if value.is_null() {
        return Ok(0.0);
    }
    value
        .as_f64()
        .ok_or_else(|| DagError::UnrecognizedGraphEntity(format!("column {index} is not a number")))
}

/// First column of every row as a node id.
pub(crate) fn decode_ids(id_kind: IdKind, rows: &Rows) -> Result<Vec<NodeId>> {
    rows.iter()
        .map(|row| id_kind.decode(cell(row, 0)?))
        .collect()
}

/// Split a `,a,b,c,` encoded path into ids.
pub(crate) fn decode_path(id_kind: IdKind, encoded: &str) -> Result<Vec<NodeId>> {
    encoded
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| id_kind.parse(part))
        .collect()
}

/// `',' || <expr> || ','`, the opening segment of an encoded path.
pub(crate) fn path_seed(expr: &str) -> String {
    format!("',' || {expr} || ','")
}

/// `instr(<path>, ',' || <expr> || ',') = 0`, the visited check.
pub(crate) fn not_visited(path: &str, expr: &str) -> String {
    format!("instr({path}, ',' || {expr} || ',') = 0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(QueryKind::Ancestors, true ; "ancestors")]
    #[test_case(QueryKind::ConnectedGraph, true ; "connected graph")]
    #[test_case(QueryKind::AllUpwardPaths, true ; "all upward paths")]
    #[test_case(QueryKind::WeightedDownwardPath, true ; "weighted path")]
    #[test_case(QueryKind::LowestCommonAncestors, false ; "lca")]
    #[test_case(QueryKind::TopologicalSort, false ; "topological sort")]
    #[test_case(QueryKind::CriticalPath, false ; "critical path")]
    #[test_case(QueryKind::TransitiveReduction, false ; "transitive reduction")]
    fn disallow_nodes_support(kind: QueryKind, expected: bool) {
        assert_eq!(kind.supports(FilterKind::DisallowNodes), expected);
    }

    #[test]
    fn no_kind_supports_node_scope() {
        for kind in QueryKind::ALL {
            assert!(!kind.supports(FilterKind::NodeScope), "{kind}");
        }
    }

    #[test]
    fn decode_path_parses_each_segment() {
        let ids = decode_path(IdKind::BigInteger, ",1,22,3,").unwrap();
        assert_eq!(ids, vec![NodeId::Int(1), NodeId::Int(22), NodeId::Int(3)]);
        assert!(decode_path(IdKind::BigInteger, ",1,x,").is_err());
    }

    #[test]
    fn missing_anchor_is_misconfigured() {
        let err = require_anchor(None, "start", QueryKind::DownwardPath, IdKind::BigInteger)
            .unwrap_err();
        assert!(matches!(err, DagError::MisconfiguredQuery(_)));
        assert!(err.to_string().contains("downward_path"));
    }
}
