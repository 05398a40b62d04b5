//! Database layer: schema descriptor and DDL.

pub mod descriptor;
pub mod schema;

pub use descriptor::{ColumnKind, EdgeColumn, GraphSchema, GraphSchemaBuilder, ScopeRelation};
