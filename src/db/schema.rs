//! SQLite schema initialization for dagstore.
//!
//! Tables are generated from a [`GraphSchema`] so the id column type, the
//! extra edge columns, and the scope relation all come from one descriptor.
//! Every statement is idempotent; opening an existing database re-runs them
//! harmlessly.

use std::time::Duration;

use rusqlite::Connection;

use crate::config::ConnectionConfig;
use crate::db::descriptor::GraphSchema;

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

fn create_nodes(schema: &GraphSchema) -> String {
    format!(
        "\
CREATE TABLE IF NOT EXISTS nodes (
  id {id_type} PRIMARY KEY,
  attributes TEXT
)",
        id_type = schema.id_kind().sql_type()
    )
}

fn create_scopes(schema: &GraphSchema) -> String {
    format!(
        "\
CREATE TABLE IF NOT EXISTS {table} (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE
)",
        table = schema.scope().table
    )
}

fn create_edges(schema: &GraphSchema) -> String {
    let id_type = schema.id_kind().sql_type();
    let scope = schema.scope();
    let extras: String = schema
        .extra_columns()
        .iter()
        .map(|c| format!("  {} {},\n", c.name, c.kind.sql_type()))
        .collect();
    format!(
        "\
CREATE TABLE IF NOT EXISTS edges (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  parent_id {id_type} NOT NULL,
  child_id {id_type} NOT NULL,
  weight REAL,
  {scope_column} INTEGER,
  attributes TEXT,
{extras}  FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE,
  FOREIGN KEY (child_id) REFERENCES nodes(id) ON DELETE CASCADE,
  FOREIGN KEY ({scope_column}) REFERENCES {scope_table}(id) ON DELETE SET NULL
)",
        scope_column = scope.column,
        scope_table = scope.table,
    )
}

// Indexes ----------------------------------------------------------------

fn create_indexes(schema: &GraphSchema) -> Vec<String> {
    vec![
        "CREATE INDEX IF NOT EXISTS idx_edges_parent ON edges(parent_id)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_edges_child ON edges(child_id)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_edges_pair ON edges(parent_id, child_id)".to_string(),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_edges_scope ON edges({})",
            schema.scope().column
        ),
    ]
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Open (or create) a database at `db_path` and apply pragmas and schema.
///
/// Pass `":memory:"` for a throwaway in-memory database.
pub fn initialize_database(
    db_path: &str,
    schema: &GraphSchema,
    connection: &ConnectionConfig,
) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    // Set first so the pragmas below also wait on a busy writer.
    conn.busy_timeout(Duration::from_millis(connection.busy_timeout_ms))?;

    // -- Pragmas ----------------------------------------------------------
    conn.pragma_update(None, "journal_mode", connection.journal_mode.as_str())?;
    // Cascading edge deletes depend on FK enforcement.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    apply_schema(&conn, schema)?;
    Ok(conn)
}

/// Create tables and indexes on an already open connection.
pub fn apply_schema(conn: &Connection, schema: &GraphSchema) -> rusqlite::Result<()> {
    // -- Core tables ------------------------------------------------------
    conn.execute_batch(&create_nodes(schema))?;
    conn.execute_batch(&create_scopes(schema))?;
    conn.execute_batch(&create_edges(schema))?;

    // -- Indexes ----------------------------------------------------------
    for ddl in create_indexes(schema) {
        conn.execute_batch(&ddl)?;
    }
    tracing::debug!(
        id_kind = %schema.id_kind(),
        extra_columns = schema.extra_columns().len(),
        "graph schema applied"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
