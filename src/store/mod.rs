//! Storage adapter boundary.
//!
//! The facade and the guard talk to storage only through [`EdgeStore`]. The
//! trait is small: execute a compiled traversal, plus the node and edge CRUD
//! the facade needs, plus a transaction scope. [`SqliteStore`] is the
//! bundled implementation.

pub mod sqlite;

use serde_json::Value;

use crate::db::descriptor::GraphSchema;
use crate::error::Result;
use crate::filter::{FilterKind, FilterSpec};
use crate::query::predicate::{and_all, hook_predicates, HookTargets, ParamList};
use crate::query::{CompiledQuery, QueryKind, Rows, TraversalQuery};
use crate::types::{Direction, Edge, EdgeId, IdKind, NewEdge, NodeId, ScopeTag, SqlValue};

pub use sqlite::SqliteStore;

// ---------------------------------------------------------------------------
// EdgePredicate
// ---------------------------------------------------------------------------

/// Selects edges for fetch, count and delete.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgePredicate {
    All,
    Ids(Vec<EdgeId>),
    /// Every edge with exactly this pair.
    Between { parent: NodeId, child: NodeId },
    ParentIs(NodeId),
    ChildIs(NodeId),
    /// Edges with the node at either end.
    Touching(NodeId),
    /// Both endpoints inside the set.
    WithinNodes(Vec<NodeId>),
    /// Parent inside the set.
    FromNodes(Vec<NodeId>),
    /// Child inside the set.
    IntoNodes(Vec<NodeId>),
    Scope(ScopeTag),
    /// Edges of `within` that a walk under `filter` may cross. Node hooks
    /// apply to the endpoint a step in direction `reached` lands on; with
    /// `reached` absent only the edge hooks apply.
    Walkable {
        within: Box<EdgePredicate>,
        filter: FilterSpec,
        reached: Option<Direction>,
    },
}

impl EdgePredicate {
    /// Render a `WHERE` condition over the unaliased `edges` table.
    pub fn compile(&self, schema: &GraphSchema, params: &mut ParamList) -> Result<String> {
        let id_kind = schema.id_kind();
        let sql = match self {
            Self::All => "1".to_string(),
            Self::Ids(ids) => in_list("id", ids.iter().map(|id| SqlValue::Integer(*id)), params),
            Self::Between { parent, child } => {
                let parent = params.bind(id_kind.check(*parent)?);
                let child = params.bind(id_kind.check(*child)?);
                format!("parent_id = {parent} AND child_id = {child}")
            }
            Self::ParentIs(id) => format!("parent_id = {}", params.bind(id_kind.check(*id)?)),
            Self::ChildIs(id) => format!("child_id = {}", params.bind(id_kind.check(*id)?)),
            Self::Touching(id) => {
                let id = params.bind(id_kind.check(*id)?);
                format!("(parent_id = {id} OR child_id = {id})")
            }
            Self::WithinNodes(ids) => {
                let values = checked(id_kind, ids)?;
                let parents = in_list("parent_id", values.iter().cloned(), params);
                let children = in_list("child_id", values.into_iter(), params);
                format!("{parents} AND {children}")
            }
            Self::FromNodes(ids) => in_list("parent_id", checked(id_kind, ids)?.into_iter(), params),
            Self::IntoNodes(ids) => in_list("child_id", checked(id_kind, ids)?.into_iter(), params),
            Self::Scope(tag) => format!("{} = {}", schema.scope().column, params.bind(*tag)),
            Self::Walkable {
                within,
                filter,
                reached,
            } => {
                filter.check_ids(id_kind)?;
                let base = within.compile(schema, params)?;
                let node = match reached {
                    Some(Direction::Downward) => "edges.child_id",
                    Some(Direction::Upward) => "edges.parent_id",
                    None => "",
                };
                let targets = HookTargets::for_edge("edges", node, &schema.scope().column);
                let mut ignored = Vec::new();
                let mut hooks = hook_predicates(
                    filter,
                    QueryKind::Descendants.supported_filters(),
                    &targets,
                    &mut ignored,
                );
                if reached.is_none() {
                    hooks.retain(|p| {
                        !matches!(p.kind(), Some(FilterKind::AllowNodes | FilterKind::DisallowNodes))
                    });
                }
                format!("({base}){}", and_all(&hooks, params))
            }
        };
        Ok(sql)
    }
}

fn checked(id_kind: IdKind, ids: &[NodeId]) -> Result<Vec<SqlValue>> {
    ids.iter()
        .map(|id| id_kind.check(*id).map(NodeId::to_sql))
        .collect()
}

/// `column IN (?a, ?b, ...)`, or `0` for an empty set.
fn in_list(column: &str, values: impl Iterator<Item = SqlValue>, params: &mut ParamList) -> String {
    let placeholders: Vec<String> = values.map(|v| params.bind(v)).collect();
    if placeholders.is_empty() {
        "0".to_string()
    } else {
        format!("{column} IN ({})", placeholders.join(", "))
    }
}

// ---------------------------------------------------------------------------
// EdgeStore
// ---------------------------------------------------------------------------

/// What the graph needs from a relational backend.
///
/// Implementations must give [`atomically`](EdgeStore::atomically) a
/// single-writer guarantee: while one scope is open no other writer on the
/// same database may commit, and a nested call joins the open scope.
pub trait EdgeStore {
    fn schema(&self) -> &GraphSchema;

    fn id_kind(&self) -> IdKind {
        self.schema().id_kind()
    }

    /// Run a compiled traversal and return its raw rows.
    fn execute(&self, query: &CompiledQuery) -> Result<Rows>;

    /// Insert a node. With `id` absent the backend assigns one.
    fn insert_node(&self, id: Option<NodeId>, attributes: Option<&Value>) -> Result<NodeId>;

    /// Delete a node and, by cascade, every edge touching it.
    fn delete_node(&self, id: NodeId) -> Result<bool>;

    fn node_exists(&self, id: NodeId) -> Result<bool>;

    /// Every node id, ascending.
    fn all_nodes(&self) -> Result<Vec<NodeId>>;

    fn insert_edge(&self, edge: &NewEdge) -> Result<Edge>;

    fn delete_edges(&self, predicate: &EdgePredicate) -> Result<usize>;

    /// Matching edges ordered by edge id.
    fn fetch_edges(&self, predicate: &EdgePredicate) -> Result<Vec<Edge>>;

    fn count_edges(&self, predicate: &EdgePredicate) -> Result<usize>;

    /// Find or create the scope row called `name`.
    fn create_scope(&self, name: &str) -> Result<ScopeTag>;

    /// Run `f` inside one write transaction, committing only on `Ok`.
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>;

    /// Compile, execute and decode a traversal.
    fn run<Q: TraversalQuery>(&self, query: &Q) -> Result<Q::Output> {
        let compiled = query.compile(self.schema())?;
        let rows = self.execute(&compiled)?;
        query.decode(self.schema(), rows)
    }
}
