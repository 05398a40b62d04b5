//! Weakly connected component of an anchor.

use crate::db::descriptor::GraphSchema;
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::query::predicate::{and_all, hook_predicates, HookTargets, ParamList};
use crate::query::{
    decode_ids, not_visited, path_seed, require_anchor, CompiledQuery, QueryKind, Rows,
    TraversalQuery, DEFAULT_MAX_DEPTH,
};
use crate::types::NodeId;

/// The endpoint of `e` that is not the frontier node.
const FAR_END: &str = "(CASE WHEN e.parent_id = t.id THEN e.child_id ELSE e.parent_id END)";

/// Every node reachable from the anchor when edge direction is ignored,
/// the anchor included, ordered by id.
///
/// Each branch carries the nodes it has visited and never steps onto one of
/// them again, so a stray cycle cannot keep the walk alive. A branch stops
/// once its path holds `max_depth` nodes. Filters apply to the recursive step
/// only; the anchor itself is always part of the result.
#[derive(Debug, Clone, Default)]
pub struct ConnectedGraphQuery {
    anchor: Option<NodeId>,
    filter: FilterSpec,
}

impl ConnectedGraphQuery {
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

impl TraversalQuery for ConnectedGraphQuery {
    type Output = Vec<NodeId>;

    fn kind(&self) -> QueryKind {
        QueryKind::ConnectedGraph
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let kind = self.kind();
        let id_kind = schema.id_kind();
        let anchor = require_anchor(self.anchor, "anchor", kind, id_kind)?;
        self.filter.check_ids(id_kind)?;
        let max_depth = self.filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);

        let mut ignored = Vec::new();
        let step_predicates = hook_predicates(
            &self.filter,
            kind.supported_filters(),
            &HookTargets::for_edge("e", FAR_END, &schema.scope().column),
            &mut ignored,
        );

        let mut params = ParamList::new();
        let anchor = id_kind.cast(&params.bind(anchor));
        let depth = params.bind(max_depth);
        let step_terms = and_all(&step_predicates, &mut params);
        let seed = path_seed(&anchor);
        let unvisited = not_visited("t.path", FAR_END);

        let sql = format!(
            "\
WITH RECURSIVE traverse(id, path, visited) AS (
    SELECT {anchor}, {seed}, 1
    UNION ALL
    SELECT {FAR_END}, t.path || {FAR_END} || ',', t.visited + 1
    FROM traverse AS t
    JOIN edges AS e ON e.parent_id = t.id OR e.child_id = t.id
    WHERE t.visited < {depth}
      AND {unvisited}{step_terms}
)
SELECT DISTINCT id
FROM traverse
ORDER BY id ASC"
        );
        Ok(CompiledQuery::new(kind, sql, params.into_values(), ignored))
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        decode_ids(schema.id_kind(), &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_only_touch_the_recursive_step() {
        let compiled = ConnectedGraphQuery::of(3_i64)
            .filter(FilterSpec::new().disallow_nodes([4_i64]).disallow_edges([8]))
            .compile(&GraphSchema::default())
            .unwrap();
        assert!(compiled.sql.contains(&format!("{FAR_END} NOT IN (?3)")));
        assert!(compiled.sql.contains("e.id NOT IN (?4)"));
        assert!(compiled.sql.contains("UNION ALL"));
        assert!(compiled.sql.contains("instr(t.path"));
    }

    #[test]
    fn anchor_seeds_its_own_path() {
        let compiled = ConnectedGraphQuery::of(3_i64)
            .compile(&GraphSchema::default())
            .unwrap();
        assert!(compiled
            .sql
            .contains("SELECT CAST(?1 AS INTEGER), ',' || CAST(?1 AS INTEGER) || ',', 1"));
    }
}
