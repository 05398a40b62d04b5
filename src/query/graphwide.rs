//! Traversals anchored on the whole graph rather than on one node.
//!
//! None of these honour filter hooks; every hook set on their filter is
//! reported as ignored. All of them respect `max_depth`.

use crate::db::descriptor::GraphSchema;
use crate::error::{DagError, Result};
use crate::filter::{FilterKind, FilterSpec};
use crate::query::paths::DEFAULT_WEIGHT_FIELD;
use crate::query::predicate::{hook_predicates, HookTargets, ParamList};
use crate::query::{
    cell, cell_f64, cell_u32, decode_path, not_visited, CompiledQuery, QueryKind, Rows,
    TraversalQuery, DEFAULT_MAX_DEPTH,
};
use crate::types::{Direction, EdgeId, NodeDepth, PathResult, WeightedPath};

/// Record every hook set on `filter` as ignored for `kind`.
fn ignored_hooks(filter: &FilterSpec, kind: QueryKind, schema: &GraphSchema) -> Vec<FilterKind> {
    let mut ignored = Vec::new();
    hook_predicates(
        filter,
        kind.supported_filters(),
        &HookTargets::for_edge("e", "e.child_id", &schema.scope().column),
        &mut ignored,
    );
    ignored
}

// ---------------------------------------------------------------------------
// TopologicalSortQuery
// ---------------------------------------------------------------------------

/// Layered root-first order of every node that touches an edge.
///
/// A node's layer is the longest distance from any root, so every parent
/// lands in a lower layer than each of its children. Islands have no edges
/// and are absent; the facade prepends them.
#[derive(Debug, Clone, Default)]
pub struct TopologicalSortQuery {
    filter: FilterSpec,
}

impl TopologicalSortQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }
}

impl TraversalQuery for TopologicalSortQuery {
    type Output = Vec<NodeDepth>;

    fn kind(&self) -> QueryKind {
        QueryKind::TopologicalSort
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let kind = self.kind();
        let ignored = ignored_hooks(&self.filter, kind, schema);
        let max_depth = self.filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);

        let mut params = ParamList::new();
        let depth = params.bind(max_depth);

        let sql = format!(
            "\
WITH RECURSIVE layered(id, depth) AS (
    SELECT DISTINCT root.parent_id, 0
    FROM edges AS root
    WHERE NOT EXISTS (SELECT 1 FROM edges AS incoming WHERE incoming.child_id = root.parent_id)
    UNION
    SELECT e.child_id, l.depth + 1
    FROM layered AS l
    JOIN edges AS e ON e.parent_id = l.id
    WHERE l.depth < {depth}
)
SELECT id, MAX(depth) AS depth
FROM layered
GROUP BY id
ORDER BY MAX(depth) ASC, id ASC"
        );
        Ok(CompiledQuery::new(kind, sql, params.into_values(), ignored))
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
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
}

// ---------------------------------------------------------------------------
// CriticalPathQuery
// ---------------------------------------------------------------------------

/// Heaviest root-to-leaf path.
///
/// Without a weight field each edge counts 1, so the heaviest path is the
/// longest. With one, missing weights count 1.0. Every node with no incoming
/// edge seeds a walk, islands included, which is what makes a lone node a
/// one-node path of weight zero. Ties go to the deeper path, then to the
/// path whose ids compare lower, id by id.
#[derive(Debug, Clone, Default)]
pub struct CriticalPathQuery {
    filter: FilterSpec,
    weight_field: Option<String>,
}

impl CriticalPathQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    /// Accumulate this edge column instead of counting hops.
    pub fn weight_field(mut self, field: &str) -> Self {
        self.weight_field = Some(field.to_string());
        self
    }

    pub fn weighted(self) -> Self {
        self.weight_field(DEFAULT_WEIGHT_FIELD)
    }
}

impl TraversalQuery for CriticalPathQuery {
    type Output = WeightedPath;

    fn kind(&self) -> QueryKind {
        QueryKind::CriticalPath
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let kind = self.kind();
        let step_weight = match &self.weight_field {
            Some(field) => {
                let column = schema.validate_weight_field(field)?;
                format!("COALESCE(CAST(e.{column} AS REAL), 1.0)")
            }
            None => "1.0".to_string(),
        };
        let ignored = ignored_hooks(&self.filter, kind, schema);
        let max_depth = self.filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);

        let mut params = ParamList::new();
        let depth = params.bind(max_depth);
        let unvisited = not_visited("w.path", "e.child_id");
        let id_kind = schema.id_kind();
        let root_key = id_kind.sort_key("n.id");
        let step_key = id_kind.sort_key("e.child_id");

        let sql = format!(
            "\
WITH RECURSIVE walk(node, depth, path, sort_key, total_weight) AS (
    SELECT n.id, 0, ',' || n.id || ',', ',' || {root_key} || ',', 0.0
    FROM nodes AS n
    WHERE NOT EXISTS (SELECT 1 FROM edges AS incoming WHERE incoming.child_id = n.id)
    UNION ALL
    SELECT e.child_id, w.depth + 1, w.path || e.child_id || ',', w.sort_key || {step_key} || ',',
        w.total_weight + {step_weight}
    FROM walk AS w
    JOIN edges AS e ON e.parent_id = w.node
    WHERE w.depth < {depth}
      AND {unvisited}
)
SELECT path, depth, total_weight
FROM walk
WHERE NOT EXISTS (SELECT 1 FROM edges AS outgoing WHERE outgoing.parent_id = walk.node)
ORDER BY total_weight DESC, depth DESC, sort_key ASC
LIMIT 1"
        );
        Ok(CompiledQuery::new(kind, sql, params.into_values(), ignored))
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        let Some(row) = rows.first() else {
            return Ok(WeightedPath::empty());
        };
        let encoded = cell(row, 0)?.as_text().unwrap_or_default();
        Ok(WeightedPath {
            path: PathResult {
                nodes: decode_path(schema.id_kind(), encoded)?,
                direction: Direction::Downward,
            },
            total_weight: cell_f64(row, 2)?,
        })
    }
}

// ---------------------------------------------------------------------------
// TransitiveReductionQuery
// ---------------------------------------------------------------------------

/// Edges implied by a longer path between the same endpoints.
///
/// Each direct edge `(p, c)` is redundant when `c` is also reachable from
/// `p` in two or more hops. Results are edge ids in ascending order; every
/// redundant edge is listed, not just the first.
#[derive(Debug, Clone, Default)]
pub struct TransitiveReductionQuery {
    filter: FilterSpec,
}

impl TransitiveReductionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }
}

impl TraversalQuery for TransitiveReductionQuery {
    type Output = Vec<EdgeId>;

    fn kind(&self) -> QueryKind {
        QueryKind::TransitiveReduction
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let kind = self.kind();
        let ignored = ignored_hooks(&self.filter, kind, schema);
        let max_depth = self.filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);

        let mut params = ParamList::new();
        let depth = params.bind(max_depth);

        let sql = format!(
            "\
WITH RECURSIVE reach(source, target, depth) AS (
    SELECT parent_id, child_id, 1
    FROM edges
    UNION
    SELECT r.source, e.child_id, r.depth + 1
    FROM reach AS r
    JOIN edges AS e ON e.parent_id = r.target
    WHERE r.depth < {depth}
)
SELECT e.id
FROM edges AS e
WHERE EXISTS (
    SELECT 1
    FROM reach AS r
    WHERE r.source = e.parent_id
      AND r.target = e.child_id
      AND r.depth >= 2
)
ORDER BY e.id ASC"
        );
        Ok(CompiledQuery::new(kind, sql, params.into_values(), ignored))
    }

    fn decode(&self, _schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        rows.iter()
            .map(|row| {
                cell(row, 0)?.as_i64().ok_or_else(|| {
                    DagError::UnrecognizedGraphEntity("edge id column is not an integer".into())
                })
            })
            .collect()
    }
}
