//! dagstore: directed acyclic graphs stored in SQLite.
//!
//! Traversals compile to bounded recursive CTEs and run inside the database.
//! Edge inserts pass a cycle guard in the same write transaction. The
//! [`Dag`] facade ties the query builders, the guard and a storage adapter
//! together.

pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod graph;
pub mod guard;
pub mod observability;
pub mod query;
pub mod store;
pub mod types;

pub use config::DagConfig;
pub use error::{DagError, Result};
pub use filter::{FilterKind, FilterSpec};
pub use graph::edge::validate_route;
pub use graph::{
    AllPathsOptions, Dag, GraphStats, PathOptions, ReductionOutcome, SpliceOptions,
    WeightedPathOptions,
};
pub use guard::{GuardOptions, MutationGuard};
pub use store::{EdgePredicate, EdgeStore, SqliteStore};
pub use types::{
    Direction, Edge, EdgeId, IdKind, NewEdge, NodeDepth, NodeId, PathResult, ScopeTag, TreeNode,
    WeightedPath,
};
