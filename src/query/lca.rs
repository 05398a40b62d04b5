//! Lowest common ancestors of two nodes.

use crate::db::descriptor::GraphSchema;
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::query::predicate::{hook_predicates, HookTargets, ParamList};
use crate::query::{
    decode_ids, require_anchor, CompiledQuery, QueryKind, Rows, TraversalQuery, DEFAULT_MAX_DEPTH,
};
use crate::types::NodeId;

/// Builds the self-and-ancestors closure of both nodes, intersects them and
/// keeps the candidates that have no child inside the intersection.
///
/// The intersection of two ancestor closures is closed upwards, so a
/// candidate with a descendant in the set always has a direct child in it
/// too. Diamonds can leave more than one survivor; the result is ordered by
/// id. No filter hook applies here; any that are set are reported in
/// [`CompiledQuery::ignored`].
#[derive(Debug, Clone, Default)]
pub struct LcaQuery {
    first: Option<NodeId>,
    second: Option<NodeId>,
    filter: FilterSpec,
}

impl LcaQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(first: impl Into<NodeId>, second: impl Into<NodeId>) -> Self {
        Self {
            first: Some(first.into()),
            second: Some(second.into()),
            filter: FilterSpec::default(),
        }
    }

    pub fn first(mut self, node: impl Into<NodeId>) -> Self {
        self.first = Some(node.into());
        self
    }

    pub fn second(mut self, node: impl Into<NodeId>) -> Self {
        self.second = Some(node.into());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }
}

impl TraversalQuery for LcaQuery {
    type Output = Vec<NodeId>;

    fn kind(&self) -> QueryKind {
        QueryKind::LowestCommonAncestors
    }

    fn compile(&self, schema: &GraphSchema) -> Result<CompiledQuery> {
        let kind = self.kind();
        let id_kind = schema.id_kind();
        let first = require_anchor(self.first, "first", kind, id_kind)?;
        let second = require_anchor(self.second, "second", kind, id_kind)?;
        let max_depth = self.filter.max_depth_bound().unwrap_or(DEFAULT_MAX_DEPTH);

        let mut ignored = Vec::new();
        hook_predicates(
            &self.filter,
            kind.supported_filters(),
            &HookTargets::for_edge("e", "e.parent_id", &schema.scope().column),
            &mut ignored,
        );

        let mut params = ParamList::new();
        let first = id_kind.cast(&params.bind(first));
        let second = id_kind.cast(&params.bind(second));
        let depth = params.bind(max_depth);

        let sql = format!(
            "\
WITH RECURSIVE
ancestors_a(id, depth) AS (
    SELECT {first}, 0
    UNION
    SELECT e.parent_id, a.depth + 1
    FROM ancestors_a AS a
    JOIN edges AS e ON e.child_id = a.id
    WHERE a.depth < {depth}
),
ancestors_b(id, depth) AS (
    SELECT {second}, 0
    UNION
    SELECT e.parent_id, b.depth + 1
    FROM ancestors_b AS b
    JOIN edges AS e ON e.child_id = b.id
    WHERE b.depth < {depth}
),
common(id) AS (
    SELECT id FROM ancestors_a
    INTERSECT
    SELECT id FROM ancestors_b
)
SELECT c.id
FROM common AS c
WHERE NOT EXISTS (
    SELECT 1
    FROM edges AS e
    JOIN common AS below ON below.id = e.child_id
    WHERE e.parent_id = c.id
)
ORDER BY c.id ASC"
        );
        Ok(CompiledQuery::new(kind, sql, params.into_values(), ignored))
    }

    fn decode(&self, schema: &GraphSchema, rows: Rows) -> Result<Self::Output> {
        decode_ids(schema.id_kind(), &rows)
    }
}
