//! Configuration: schema types and multi-source loading.

pub mod loader;
pub mod schema;

pub use schema::{ConnectionConfig, DagConfig, JournalMode};
