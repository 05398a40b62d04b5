//! SQLite implementation of [`EdgeStore`].
//!
//! Every statement goes through [`Connection::prepare_cached`], so repeated
//! traversals of the same shape reuse their compiled statement. Write scopes
//! use `BEGIN IMMEDIATE`, which takes the database's single RESERVED lock up
//! front; a second connection's scope waits on `busy_timeout` until the
//! first one commits or rolls back.

use std::sync::Arc;
use std::time::Instant;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value as RusqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row, ToSql, Transaction, TransactionBehavior};
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::db::descriptor::GraphSchema;
use crate::db::schema::{apply_schema, initialize_database};
use crate::error::{DagError, Result};
use crate::observability::{QueryObserver, QueryRecord};
use crate::query::predicate::ParamList;
use crate::query::{CompiledQuery, Rows};
use crate::store::{EdgePredicate, EdgeStore};
use crate::types::{Edge, IdKind, NewEdge, NodeId, ScopeTag, SqlValue};

// ---------------------------------------------------------------------------
// SqlValue <-> rusqlite
// ---------------------------------------------------------------------------

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(RusqliteValue::Null),
            SqlValue::Integer(n) => ToSqlOutput::from(*n),
            SqlValue::Real(r) => ToSqlOutput::from(*r),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for SqlValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(SqlValue::Null),
            ValueRef::Integer(n) => Ok(SqlValue::Integer(n)),
            ValueRef::Real(r) => Ok(SqlValue::Real(r)),
            ValueRef::Text(t) => Ok(SqlValue::Text(String::from_utf8_lossy(t).into_owned())),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Graph storage on a single SQLite connection.
///
/// Not `Sync`: give each thread its own store on the same database file.
pub struct SqliteStore {
    conn: Connection,
    schema: GraphSchema,
    observer: Option<Arc<dyn QueryObserver>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("schema", &self.schema)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` with the given schema.
    pub fn open(db_path: &str, schema: GraphSchema, connection: &ConnectionConfig) -> Result<Self> {
        let conn = initialize_database(db_path, &schema, connection)?;
        Ok(Self::wrap(conn, schema))
    }

    /// Throwaway in-memory database.
    pub fn in_memory(schema: GraphSchema) -> Result<Self> {
        Self::open(":memory:", schema, &ConnectionConfig::default())
    }

    /// Adopt an already open connection, creating the tables if needed.
    pub fn from_connection(conn: Connection, schema: GraphSchema) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_schema(&conn, &schema)?;
        Ok(Self::wrap(conn, schema))
    }

    fn wrap(conn: Connection, schema: GraphSchema) -> Self {
        Self {
            conn,
            schema,
            observer: None,
        }
    }

    /// Report every executed traversal to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // -- Row mapping ------------------------------------------------------

    fn edge_columns(&self) -> String {
        let mut columns = format!(
            "id, parent_id, child_id, weight, {}, attributes",
            self.schema.scope().column
        );
        for extra in self.schema.extra_columns() {
            columns.push_str(", ");
            columns.push_str(&extra.name);
        }
        columns
    }

    fn row_to_edge(&self, row: &Row<'_>) -> Result<Edge> {
        let id_kind = self.schema.id_kind();
        let id: i64 = row.get(0)?;
        let attributes = match row.get::<_, Option<String>>(5)? {
            Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
                DagError::UnrecognizedGraphEntity(format!("edge {id} attributes are not JSON: {e}"))
            })?),
            None => None,
        };
        let mut columns = std::collections::BTreeMap::new();
        for (offset, extra) in self.schema.extra_columns().iter().enumerate() {
            columns.insert(extra.name.clone(), row.get::<_, SqlValue>(6 + offset)?);
        }
        Ok(Edge {
            id,
            parent: id_kind.decode(&row.get::<_, SqlValue>(1)?)?,
            child: id_kind.decode(&row.get::<_, SqlValue>(2)?)?,
            weight: row.get(3)?,
            scope: row.get::<_, Option<i64>>(4)?.map(ScopeTag),
            attributes,
            columns,
        })
    }

    fn where_clause(&self, predicate: &EdgePredicate) -> Result<(String, Vec<SqlValue>)> {
        let mut params = ParamList::new();
        let condition = predicate.compile(&self.schema, &mut params)?;
        Ok((condition, params.into_values()))
    }

    fn next_node_id(&self, id_kind: IdKind) -> Option<NodeId> {
        match id_kind {
            IdKind::Uuid => Some(NodeId::new_uuid()),
            // NULL into an INTEGER PRIMARY KEY picks the next rowid.
            IdKind::Integer | IdKind::BigInteger => None,
        }
    }
}

impl EdgeStore for SqliteStore {
    fn schema(&self) -> &GraphSchema {
        &self.schema
    }

    fn execute(&self, query: &CompiledQuery) -> Result<Rows> {
        let started = Instant::now();
        let mut stmt = self.conn.prepare_cached(&query.sql)?;
        let width = stmt.column_count();
        let rows = stmt
            .query_and_then(params_from_iter(query.params.iter()), |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Rows>>()?;
        let elapsed = started.elapsed();

        tracing::debug!(
            query = %query.kind,
            rows = rows.len(),
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "traversal executed"
        );
        if let Some(observer) = &self.observer {
            observer.on_query(&QueryRecord {
                kind: query.kind,
                sql: query.sql.clone(),
                params: query.params.clone(),
                rows: rows.len(),
                elapsed,
            });
        }
        Ok(rows)
    }

    fn insert_node(&self, id: Option<NodeId>, attributes: Option<&Value>) -> Result<NodeId> {
        let id_kind = self.schema.id_kind();
        let id = match id {
            Some(id) => Some(id_kind.check(id)?),
            None => self.next_node_id(id_kind),
        };
        let attributes = attributes.map(Value::to_string);
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO nodes (id, attributes) VALUES (?1, ?2)")?;
        stmt.execute(rusqlite::params![SqlValue::from(id), attributes])?;
        Ok(id.unwrap_or_else(|| NodeId::Int(self.conn.last_insert_rowid())))
    }

    fn delete_node(&self, id: NodeId) -> Result<bool> {
        let id = self.schema.id_kind().check(id)?;
        let mut stmt = self.conn.prepare_cached("DELETE FROM nodes WHERE id = ?1")?;
        Ok(stmt.execute([id.to_sql()])? > 0)
    }

    fn node_exists(&self, id: NodeId) -> Result<bool> {
        let id = self.schema.id_kind().check(id)?;
        let mut stmt = self
            .conn
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)")?;
        Ok(stmt.query_row([id.to_sql()], |row| row.get(0))?)
    }

    fn all_nodes(&self) -> Result<Vec<NodeId>> {
        let id_kind = self.schema.id_kind();
        let mut stmt = self.conn.prepare_cached("SELECT id FROM nodes ORDER BY id ASC")?;
        let ids = stmt
            .query_and_then([], |row| -> Result<NodeId> {
                id_kind.decode(&row.get::<_, SqlValue>(0)?)
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn insert_edge(&self, edge: &NewEdge) -> Result<Edge> {
        let id_kind = self.schema.id_kind();
        let (parent, child) = edge.endpoints()?;
        let (parent, child) = (id_kind.check(parent)?, id_kind.check(child)?);

        let mut columns = vec![
            "parent_id".to_string(),
            "child_id".to_string(),
            "weight".to_string(),
            self.schema.scope().column.clone(),
            "attributes".to_string(),
        ];
        let mut values = vec![
            parent.to_sql(),
            child.to_sql(),
            SqlValue::from(edge.weight),
            SqlValue::from(edge.scope),
            SqlValue::from(edge.attributes.as_ref().map(Value::to_string)),
        ];
        for (name, value) in &edge.columns {
            if !self.schema.extra_columns().iter().any(|c| &c.name == name) {
                return Err(DagError::UnrecognizedGraphEntity(format!(
                    "`{name}` is not a registered edge column"
                )));
            }
            columns.push(name.clone());
            values.push(value.clone());
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO edges ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))?;

        let id = self.conn.last_insert_rowid();
        self.fetch_edges(&EdgePredicate::Ids(vec![id]))?
            .into_iter()
            .next()
            .ok_or_else(|| DagError::UnrecognizedGraphEntity(format!("edge {id} vanished after insert")))
    }

    fn delete_edges(&self, predicate: &EdgePredicate) -> Result<usize> {
        let (condition, params) = self.where_clause(predicate)?;
        let sql = format!("DELETE FROM edges WHERE {condition}");
        Ok(self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params.iter()))?)
    }

    fn fetch_edges(&self, predicate: &EdgePredicate) -> Result<Vec<Edge>> {
        let (condition, params) = self.where_clause(predicate)?;
        let sql = format!(
            "SELECT {} FROM edges WHERE {condition} ORDER BY id ASC",
            self.edge_columns()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let edges = stmt
            .query_and_then(params_from_iter(params.iter()), |row| self.row_to_edge(row))?
            .collect::<Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn count_edges(&self, predicate: &EdgePredicate) -> Result<usize> {
        let (condition, params) = self.where_clause(predicate)?;
        let sql = format!("SELECT count(*) FROM edges WHERE {condition}");
        let count: i64 = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn create_scope(&self, name: &str) -> Result<ScopeTag> {
        let table = &self.schema.scope().table;
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO {table} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING"
            ))?
            .execute([name])?;
        let id: i64 = self
            .conn
            .prepare_cached(&format!("SELECT id FROM {table} WHERE name = ?1"))?
            .query_row([name], |row| row.get(0))?;
        Ok(ScopeTag(id))
    }

    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        // Already inside a scope: join it.
        if !self.conn.is_autocommit() {
            return f();
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        match f() {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed write scope did not complete");
                }
                Err(err)
            }
        }
    }
}
