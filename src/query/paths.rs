//! Path enumeration between two nodes.
//!
//! All path builders share one walk: a recursive CTE that carries the
//! comma-delimited list of nodes visited so far, refuses to step onto any of
//! them again, and stops a branch at the target or at `max_depth` edges.
//! Rows are ordered by depth and then by the node ids along the path,
//! compared id by id the way the ids themselves compare, so the single-path
//! answer is always the first row of the all-paths answer.

use crate::db::descriptor::GraphSchema;
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::query::predicate::{and_all, hook_predicates, HookTargets, ParamList};
use crate::query::{
    cell, cell_f64, decode_path, not_visited, require_anchor, CompiledQuery, QueryKind, Rows,
    TraversalQuery, DEFAULT_MAX_DEPTH,
};
use crate::types::{Direction, NodeId, PathResult, SqlValue, WeightedPath};

/// Cap applied to all-paths enumeration when the builder is given none.
pub const DEFAULT_MAX_PATHS: usize = 1000;

/// Weight column used when a weighted query names none.
pub const DEFAULT_WEIGHT_FIELD: &str = "weight";

// ---------------------------------------------------------------------------
// Shared walk
// ---------------------------------------------------------------------------

struct Walk<'a> {
    kind: QueryKind,
    direction: Direction,
    start: Option<NodeId>,
    end: Option<NodeId>,
    filter: &'a FilterSpec,
    /// Validated weight column, when accumulating weights.
    weight: Option<&'a str>,
    limit: usize,
}

/// `(column matched against the frontier, column reached by the step)`
fn walk_columns(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::Downward => ("parent_id", "child_id"),
        Direction::Upward => ("child_id", "parent_id"),
    }
}

fn unit_weight(alias: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("COALESCE(CAST({alias}.{column} AS REAL), 1.0)"),
        None => "1.0".to_string(),
    }
}

impl Walk<'_> {
    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let id_kind = schema.id_kind();
        let start = require_anchor(self.start, "start", self.kind, id_kind)?;
        let end = require_anchor(self.end, "end", self.kind, id_kind)?;
        self.filter.check_ids(id_kind)?;
        let max_depth = self.filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);
        let (from, to) = walk_columns(self.direction);
        let scope_column = &schema.scope().column;

        let mut ignored = Vec::new();
        let supported = self.kind.supported_filters();
        let anchor_predicates = hook_predicates(
            self.filter,
            supported,
            &HookTargets::for_edge("first", &format!("first.{to}"), scope_column),
            &mut ignored,
        );
        let step_predicates = hook_predicates(
            self.filter,
            supported,
            &HookTargets::for_edge("e", &format!("e.{to}"), scope_column),
            &mut ignored,
        );

        let mut params = ParamList::new();
        let start = id_kind.cast(&params.bind(start));
        let end = id_kind.cast(&params.bind(end));
        let depth = params.bind(max_depth);
        let limit = params.bind(i64::try_from(self.limit).unwrap_or(i64::MAX));
        let anchor_terms = and_all(&anchor_predicates, &mut params);
        let step_terms = and_all(&step_predicates, &mut params);
        let unvisited = not_visited("t.path", &format!("e.{to}"));
        let first_key = id_kind.sort_key(&format!("first.{from}"));
        let reached_key = id_kind.sort_key(&format!("first.{to}"));
        let step_key = id_kind.sort_key(&format!("e.{to}"));

        let (columns, anchor_weight, step_weight, weight_out, order) = match self.weight {
            Some(_) => (
                "node, depth, path, sort_key, total_weight",
                format!(", {}", unit_weight("first", self.weight)),
                format!(", t.total_weight + {}", unit_weight("e", self.weight)),
                ", total_weight",
                "total_weight ASC, depth ASC, sort_key ASC",
            ),
            None => (
                "node, depth, path, sort_key",
                String::new(),
                String::new(),
                "",
                "depth ASC, sort_key ASC",
            ),
        };

        let sql = format!(
            "\
WITH RECURSIVE traverse({columns}) AS (
    SELECT first.{to}, 1, ',' || first.{from} || ',' || first.{to} || ',',
        ',' || {first_key} || ',' || {reached_key} || ','{anchor_weight}
    FROM edges AS first
    WHERE first.{from} = {start}
      AND first.{to} <> first.{from}{anchor_terms}
    UNION ALL
    SELECT e.{to}, t.depth + 1, t.path || e.{to} || ',', t.sort_key || {step_key} || ','{step_weight}
    FROM traverse AS t
    JOIN edges AS e ON e.{from} = t.node
    WHERE t.depth < {depth}
      AND t.node <> {end}
      AND {unvisited}{step_terms}
)
SELECT DISTINCT path, depth{weight_out}, sort_key
FROM traverse
WHERE node = {end}
ORDER BY {order}
LIMIT {limit}"
        );
        Ok(CompiledQuery::new(self.kind, sql, params.into_values(), ignored))
    }
}

fn decode_paths(
    schema: &GraphSchema,
    direction: Direction,
    rows: &[Vec<SqlValue>],
) -> Result<Vec<PathResult>> {
    rows.iter()
        .map(|row| {
            let encoded = cell(row, 0)?.as_text().unwrap_or_default();
            Ok(PathResult {
                nodes: decode_path(schema.id_kind(), encoded)?,
                direction,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PathQuery
// ---------------------------------------------------------------------------

/// Shortest path, or every path up to a cap, between two nodes.
///
/// ```
/// use dagstore::query::PathQuery;
///
/// let shortest = PathQuery::downward(1_i64, 4_i64);
/// let capped = PathQuery::upward(4_i64, 1_i64).all(10);
/// # let _ = (shortest, capped);
/// ```
#[derive(Debug, Clone)]
pub struct PathQuery {
    direction: Direction,
    start: Option<NodeId>,
    end: Option<NodeId>,
    filter: FilterSpec,
    /// `None` selects the single shortest path.
    max_results: Option<usize>,
}

impl PathQuery {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            start: None,
            end: None,
            filter: FilterSpec::default(),
            max_results: None,
        }
    }

    pub fn downward(start: impl Into<NodeId>, end: impl Into<NodeId>) -> Self {
        Self::new(Direction::Downward).from(start).to(end)
    }

    pub fn upward(start: impl Into<NodeId>, end: impl Into<NodeId>) -> Self {
        Self::new(Direction::Upward).from(start).to(end)
    }

    pub fn from(mut self, node: impl Into<NodeId>) -> Self {
        self.start = Some(node.into());
        self
    }

    pub fn to(mut self, node: impl Into<NodeId>) -> Self {
        self.end = Some(node.into());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    /// Enumerate every path, keeping at most `max_results`.
    pub fn all(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results.max(1));
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl TraversalQuery for PathQuery {
    type Output = Vec<PathResult>;

    fn kind(&self) -> QueryKind {
        match (self.direction, self.max_results) {
            (Direction::Downward, None) => QueryKind::DownwardPath,
            (Direction::Upward, None) => QueryKind::UpwardPath,
            (Direction::Downward, Some(_)) => QueryKind::AllDownwardPaths,
            (Direction::Upward, Some(_)) => QueryKind::AllUpwardPaths,
        }
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        Walk {
            kind: self.kind(),
            direction: self.direction,
            start: self.start,
            end: self.end,
            filter: &self.filter,
            weight: None,
            limit: self.max_results.unwrap_or(1),
        }
        .compile(schema)
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        decode_paths(schema, self.direction, &rows)
    }
}

// ---------------------------------------------------------------------------
// WeightedPathQuery
// ---------------------------------------------------------------------------

/// Minimum cumulative weight path between two nodes.
///
/// Exhaustive over self-avoiding walks up to `max_depth` edges. Missing
/// weights count as 1.0.
#[derive(Debug, Clone)]
pub struct WeightedPathQuery {
    direction: Direction,
    start: Option<NodeId>,
    end: Option<NodeId>,
    filter: FilterSpec,
    weight_field: String,
}

impl WeightedPathQuery {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            start: None,
            end: None,
            filter: FilterSpec::default(),
            weight_field: DEFAULT_WEIGHT_FIELD.to_string(),
        }
    }

    pub fn downward(start: impl Into<NodeId>, end: impl Into<NodeId>) -> Self {
        Self::new(Direction::Downward).from(start).to(end)
    }

    pub fn upward(start: impl Into<NodeId>, end: impl Into<NodeId>) -> Self {
        Self::new(Direction::Upward).from(start).to(end)
    }

    pub fn from(mut self, node: impl Into<NodeId>) -> Self {
        self.start = Some(node.into());
        self
    }

    pub fn to(mut self, node: impl Into<NodeId>) -> Self {
        self.end = Some(node.into());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn weight_field(mut self, field: &str) -> Self {
        self.weight_field = field.to_string();
        self
    }
}

impl TraversalQuery for WeightedPathQuery {
    type Output = Option<WeightedPath>;

    fn kind(&self) -> QueryKind {
        match self.direction {
            Direction::Downward => QueryKind::WeightedDownwardPath,
            Direction::Upward => QueryKind::WeightedUpwardPath,
        }
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let weight = schema.validate_weight_field(&self.weight_field)?;
        Walk {
            kind: self.kind(),
            direction: self.direction,
            start: self.start,
            end: self.end,
            filter: &self.filter,
            weight: Some(weight),
            limit: 1,
        }
        .compile(schema)
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let path = decode_paths(schema, self.direction, &rows[..1])?
            .into_iter()
            .next();
        Ok(match path {
            Some(path) => Some(WeightedPath {
                path,
                total_weight: cell_f64(row, 2)?,
            }),
            None => None,
        })
    }
}
