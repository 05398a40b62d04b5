//! Structured logging and query capture.
//!
//! - [`init_logging`] sets up a `tracing` subscriber once per process.
//! - [`QueryObserver`] receives a [`QueryRecord`] for every statement a store
//!   executes on behalf of a traversal.
//! - [`QueryLog`] is an observer that keeps those records for inspection.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::query::QueryKind;
use crate::types::SqlValue;

/// Initialize structured logging with `RUST_LOG` support.
///
/// Defaults to `dagstore=info` when `RUST_LOG` is not set. Repeated calls
/// are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dagstore=info"));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// Query capture
// ---------------------------------------------------------------------------

/// One executed traversal statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub kind: QueryKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Result rows returned.
    pub rows: usize,
    pub elapsed: Duration,
}

impl QueryRecord {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind.as_str(),
            "sql": self.sql,
            "params": self.params,
            "rows": self.rows,
            "elapsed_us": u64::try_from(self.elapsed.as_micros()).unwrap_or(u64::MAX),
        })
    }
}

/// Receives every traversal a store executes.
///
/// Injected into a store at construction; nothing is captured through
/// global state.
pub trait QueryObserver: Send + Sync {
    fn on_query(&self, record: &QueryRecord);
}

/// In-memory collector of [`QueryRecord`]s.
///
/// Share it with a store through an `Arc` and read it back afterwards.
#[derive(Debug, Default)]
pub struct QueryLog {
    records: Mutex<Vec<QueryRecord>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueryRecord>> {
        // A poisoned log still holds valid records.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<QueryRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Kinds of the captured queries in execution order.
    pub fn kinds(&self) -> Vec<QueryKind> {
        self.lock().iter().map(|r| r.kind).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.lock().iter().map(QueryRecord::to_json).collect())
    }
}

impl QueryObserver for QueryLog {
    fn on_query(&self, record: &QueryRecord) {
        self.lock().push(record.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
