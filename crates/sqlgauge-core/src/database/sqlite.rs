use super::{Database, ResultSet, SqlValue};
use crate::errors::ExecutionError;
use anyhow::Context;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite evaluation database. Cloning shares the same connection; the
/// connection lives until [`SqliteDatabase::close`] or the last clone drops.
#[derive(Clone)]
pub struct SqliteDatabase {
    name: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDatabase {
    pub fn connect(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        tracing::info!(event = "db.connected", database = %path.display());
        Ok(Self {
            name: path.display().to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            name: ":memory:".to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Closes the shared connection. Later calls on any clone fail with
    /// an `ExecutionError`.
    pub fn close(&self) -> anyhow::Result<()> {
        let mut guard = self.lock();
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| e)
                .with_context(|| format!("failed to close {}", self.name))?;
            tracing::info!(event = "db.closed", database = %self.name);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs a multi-statement script, e.g. fixture DDL.
    pub fn execute_script(&self, sql: &str) -> anyhow::Result<()> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or_else(not_connected)?;
        conn.execute_batch(sql)
            .map_err(|e| ExecutionError::new(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        // a panic while holding the lock leaves the connection usable
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn not_connected() -> ExecutionError {
    ExecutionError::new("no database connection established")
}

impl Database for SqliteDatabase {
    fn execute(&self, sql: &str) -> anyhow::Result<()> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or_else(not_connected)?;
        conn.execute_batch(sql)
            .map_err(|e| ExecutionError::new(e.to_string()))?;
        Ok(())
    }

    fn execute_with_results(&self, sql: &str) -> anyhow::Result<ResultSet> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or_else(not_connected)?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ExecutionError::new(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt
            .query([])
            .map_err(|e| ExecutionError::new(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| ExecutionError::new(e.to_string()))? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                let v = row
                    .get_ref(i)
                    .map_err(|e| ExecutionError::new(e.to_string()))?;
                cells.push(to_value(v));
            }
            out.push(cells);
        }

        Ok(ResultSet { columns, rows: out })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn to_value(v: ValueRef<'_>) -> SqlValue {
    match v {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}
