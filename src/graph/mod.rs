//! Graph facade: node, edge and graph-wide operations over an [`EdgeStore`].
//!
//! [`Dag`] picks a builder for each operation, runs it through the store and
//! reorders the resulting ids into the order the traversal defines. Every
//! edge insert goes through the [`MutationGuard`] inside one write scope.

pub mod edge;
pub mod node;
pub mod stats;
pub mod tree;

use std::collections::BTreeSet;

use crate::config::DagConfig;
use crate::db::descriptor::GraphSchema;
use crate::error::{DagError, Result};
use crate::filter::FilterSpec;
use crate::guard::MutationGuard;
use crate::store::{EdgePredicate, EdgeStore, SqliteStore};
use crate::types::{Direction, NodeId};

pub use stats::{GraphStats, ReductionOutcome};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for single-path operations.
#[derive(Debug, Clone, PartialEq)]
pub struct PathOptions {
    /// When false, an upward search runs if the downward one finds nothing.
    pub directional: bool,
    pub filter: FilterSpec,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            directional: true,
            filter: FilterSpec::default(),
        }
    }
}

impl PathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undirected(mut self) -> Self {
        self.directional = false;
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }
}

/// Options for [`Dag::all_paths`].
#[derive(Debug, Clone, PartialEq)]
pub struct AllPathsOptions {
    pub directional: bool,
    pub filter: FilterSpec,
    /// Result cap. `None` uses the configured `max_paths`.
    pub max_results: Option<usize>,
}

impl Default for AllPathsOptions {
    fn default() -> Self {
        Self {
            directional: true,
            filter: FilterSpec::default(),
            max_results: None,
        }
    }
}

impl AllPathsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undirected(mut self) -> Self {
        self.directional = false;
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn max_results(mut self, cap: usize) -> Self {
        self.max_results = Some(cap);
        self
    }
}

/// Options for the weighted path operations.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPathOptions {
    pub directional: bool,
    pub filter: FilterSpec,
    pub weight_field: String,
}

impl Default for WeightedPathOptions {
    fn default() -> Self {
        Self {
            directional: true,
            filter: FilterSpec::default(),
            weight_field: crate::query::paths::DEFAULT_WEIGHT_FIELD.to_string(),
        }
    }
}

impl WeightedPathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undirected(mut self) -> Self {
        self.directional = false;
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

/// How [`Dag::insert_node`] builds the two replacement edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpliceOptions {
    /// Copy weight, scope and attributes onto the parent-side edge.
    pub clone_to_rootside: bool,
    /// Copy them onto the child-side edge.
    pub clone_to_leafside: bool,
}

// ---------------------------------------------------------------------------
// Dag
// ---------------------------------------------------------------------------

/// A directed acyclic graph stored in `S`.
#[derive(Debug)]
pub struct Dag<S: EdgeStore> {
    store: S,
    config: DagConfig,
}

impl Dag<SqliteStore> {
    /// Open a SQLite-backed graph with the default tables for
    /// `config.id_kind`.
    pub fn open(db_path: &str, config: DagConfig) -> Result<Self> {
        let schema = GraphSchema::with_id_kind(config.id_kind);
        Self::open_with_schema(db_path, schema, config)
    }

    pub fn open_with_schema(db_path: &str, schema: GraphSchema, config: DagConfig) -> Result<Self> {
        let store = SqliteStore::open(db_path, schema, &config.connection)?;
        Self::new(store, config)
    }

    /// In-memory graph with default config.
    pub fn in_memory(schema: GraphSchema) -> Result<Self> {
        Self::new(SqliteStore::in_memory(schema)?, DagConfig::default())
    }
}

impl<S: EdgeStore> Dag<S> {
    pub fn new(store: S, config: DagConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DagConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// The caller's filter with the configured depth bound filled in.
    pub(crate) fn bounded(&self, filter: Option<&FilterSpec>) -> FilterSpec {
        filter
            .cloned()
            .unwrap_or_default()
            .or_max_depth(self.config.max_depth)
    }

    pub(crate) fn guard(&self) -> MutationGuard<'_, S> {
        MutationGuard::new(&self.store).max_depth(self.config.max_depth)
    }

    pub(crate) fn require_node(&self, id: NodeId) -> Result<NodeId> {
        if self.store.node_exists(id)? {
            Ok(id)
        } else {
            Err(DagError::UnrecognizedGraphEntity(format!("node {id} does not exist")))
        }
    }
}

/// `within`, narrowed to the edges a walk under `filter` may cross.
pub(crate) fn walkable(
    within: EdgePredicate,
    filter: Option<&FilterSpec>,
    reached: Option<Direction>,
) -> EdgePredicate {
    match filter {
        Some(filter) => EdgePredicate::Walkable {
            within: Box::new(within),
            filter: filter.clone(),
            reached,
        },
        None => within,
    }
}

/// Drop repeated ids, keeping the first occurrence.
pub(crate) fn dedup_ordered(ids: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared graphs for the facade tests.

    use super::*;
    use crate::guard::GuardOptions;

    pub fn setup() -> Dag<SqliteStore> {
        Dag::in_memory(GraphSchema::default()).unwrap()
    }

    pub fn nodes(dag: &Dag<SqliteStore>, n: usize) -> Vec<NodeId> {
        (0..n).map(|_| dag.add_node().unwrap()).collect()
    }

    pub fn link(dag: &Dag<SqliteStore>, parent: NodeId, child: NodeId) {
        dag.add_child(parent, child, GuardOptions::default()).unwrap();
    }

    /// `root -> {a1, a2, a3}; a1 -> b1; a2 -> b1; a3 -> b2` plus an island.
    pub struct Small {
        pub root: NodeId,
        pub a1: NodeId,
        pub a2: NodeId,
        pub a3: NodeId,
        pub b1: NodeId,
        pub b2: NodeId,
        pub island: NodeId,
    }

    pub fn small(dag: &Dag<SqliteStore>) -> Small {
        let n = nodes(dag, 7);
        let g = Small {
            root: n[0],
            a1: n[1],
            a2: n[2],
            a3: n[3],
            b1: n[4],
            b2: n[5],
            island: n[6],
        };
        for (p, c) in [
            (g.root, g.a1),
            (g.root, g.a2),
            (g.root, g.a3),
            (g.a1, g.b1),
            (g.a2, g.b1),
            (g.a3, g.b2),
        ] {
            link(dag, p, c);
        }
        g
    }
}
