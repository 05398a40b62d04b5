//! Ancestor and descendant closures with depth annotation.
//!
//! Both walk one direction from an anchor with `UNION` over `(id, depth)`,
//! so a node reached along several paths appears once per distinct depth;
//! the outer query folds those into the deepest occurrence. Ordering by that
//! depth yields a root-to-leaf sequence of the visited subset.

use crate::db::descriptor::GraphSchema;
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::query::predicate::{and_all, hook_predicates, HookTargets, ParamList};
use crate::query::{
    cell, cell_u32, require_anchor, CompiledQuery, QueryKind, Rows, TraversalQuery,
    DEFAULT_MAX_DEPTH,
};
use crate::types::{NodeDepth, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Up,
    Down,
}

impl Side {
    fn kind(self) -> QueryKind {
        match self {
            Side::Up => QueryKind::Ancestors,
            Side::Down => QueryKind::Descendants,
        }
    }

    /// (column matched against the frontier, column reached by the step)
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            Side::Up => ("child_id", "parent_id"),
            Side::Down => ("parent_id", "child_id"),
        }
    }

    /// Root-most first in both directions.
    fn depth_order(self) -> &'static str {
        match self {
            Side::Up => "DESC",
            Side::Down => "ASC",
        }
    }
}

fn compile_closure(
    side: Side,
    anchor: Option<NodeId>,
    filter: &FilterSpec,
    schema: &GraphSchema,
) -> Result<CompiledQuery> {
    let kind = side.kind();
    let id_kind = schema.id_kind();
    let anchor = require_anchor(anchor, "anchor", kind, id_kind)?;
    filter.check_ids(id_kind)?;
    let max_depth = filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);
    let (matched, reached) = side.columns();
    let scope_column = &schema.scope().column;

    let mut ignored = Vec::new();
    let supported = kind.supported_filters();
    let anchor_predicates = hook_predicates(
        filter,
        supported,
        &HookTargets::for_edge("first", &format!("first.{reached}"), scope_column),
        &mut ignored,
    );
    let step_predicates = hook_predicates(
        filter,
        supported,
        &HookTargets::for_edge("e", &format!("e.{reached}"), scope_column),
        &mut ignored,
    );

    let mut params = ParamList::new();
    let anchor = id_kind.cast(&params.bind(anchor));
    let depth = params.bind(max_depth);
    let anchor_terms = and_all(&anchor_predicates, &mut params);
    let step_terms = and_all(&step_predicates, &mut params);
    let order = side.depth_order();

    let sql = format!(
        "\
WITH RECURSIVE traverse(id, depth) AS (
    SELECT first.{reached}, 1
    FROM edges AS first
    WHERE first.{matched} = {anchor}{anchor_terms}
    UNION
    SELECT e.{reached}, t.depth + 1
    FROM traverse AS t
    JOIN edges AS e ON e.{matched} = t.id
    WHERE t.depth < {depth}{step_terms}
)
SELECT id, MAX(depth) AS depth
FROM traverse
WHERE depth <= {depth} AND id <> {anchor}
GROUP BY id
ORDER BY MAX(depth) {order}, id ASC"
    );
    Ok(CompiledQuery::new(kind, sql, params.into_values(), ignored))
}

fn decode_depths(schema: &GraphSchema, rows: Rows) -> Result<Vec<NodeDepth>> {
    let id_kind = schema.id_kind();
    rows.iter()
        .map(|row| {
            Ok(NodeDepth {
                id: id_kind.decode(cell(row, 0)?)?,
                depth: cell_u32(row, 1)?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// AncestorQuery
// ---------------------------------------------------------------------------

/// Nodes above an anchor, deepest (root-most) first.
#[derive(Debug, Clone, Default)]
pub struct AncestorQuery {
    anchor: Option<NodeId>,
    filter: FilterSpec,
}

impl AncestorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(node: impl Into<NodeId>) -> Self {
        Self::new().anchor(node)
    }

    pub fn anchor(mut self, node: impl Into<NodeId>) -> Self {
        self.anchor = Some(node.into());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }
}

impl TraversalQuery for AncestorQuery {
    type Output = Vec<NodeDepth>;

    fn kind(&self) -> QueryKind {
        QueryKind::Ancestors
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        compile_closure(Side::Up, self.anchor, &self.filter, schema)
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        decode_depths(schema, rows)
    }
}

// ---------------------------------------------------------------------------
// DescendantQuery
// ---------------------------------------------------------------------------

/// Nodes below an anchor, shallowest (root-most) first.
#[derive(Debug, Clone, Default)]
pub struct DescendantQuery {
    anchor: Option<NodeId>,
    filter: FilterSpec,
}

impl DescendantQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(node: impl Into<NodeId>) -> Self {
        Self::new().anchor(node)
    }

    pub fn anchor(mut self, node: impl Into<NodeId>) -> Self {
        self.anchor = Some(node.into());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }
}

impl TraversalQuery for DescendantQuery {
    type Output = Vec<NodeDepth>;

    fn kind(&self) -> QueryKind {
        QueryKind::Descendants
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        compile_closure(Side::Down, self.anchor, &self.filter, schema)
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        decode_depths(schema, rows)
    }
}
