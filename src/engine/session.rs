use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use duckdb::types::Value;
use duckdb::{params_from_iter, Appender, Connection};
use tracing::debug;

use super::functions::{RowSource, ScanFunction, SourceRegistry};
use super::result::{value_to_i64, QueryResult};
use super::sql::{Ident, Statement};
use crate::error::BidsResult;

/// One isolated engine workspace.
///
/// Everything the loaders create (tables, views, table functions and scan
/// handles) lives here. Scan functions registered on this session resolve
/// handles against its own `SourceRegistry`.
pub struct Session {
    conn: Connection,
    sources: SourceRegistry,
    functions: RefCell<HashSet<String>>,
    /// owner (view name) -> handle currently backing it
    owners: RefCell<HashMap<String, String>>,
}

impl Session {
    pub fn open_in_memory() -> BidsResult<Self> { Ok(Self::from_connection(Connection::open_in_memory()?)) }

    pub fn open(path: &Path) -> BidsResult<Self> { Ok(Self::from_connection(Connection::open(path)?)) }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            sources: SourceRegistry::default(),
            functions: RefCell::new(HashSet::new()),
            owners: RefCell::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &Connection { &self.conn }

    /// Execute one statement with its bound parameters; returns the affected row count.
    pub fn execute(&self, stmt: &Statement) -> BidsResult<usize> {
        debug!(target: "bids_duckdb::engine", "execute: {} (params={})", stmt.sql(), stmt.params().len());
        Ok(self.conn.execute(stmt.sql(), params_from_iter(stmt.params().iter()))?)
    }

    /// Execute caller-supplied SQL text without parameters (may hold several statements).
    pub fn execute_batch(&self, sql: &str) -> BidsResult<()> {
        debug!(target: "bids_duckdb::engine", "execute_batch: {}", sql);
        Ok(self.conn.execute_batch(sql)?)
    }

    pub fn query(&self, sql: &str) -> BidsResult<QueryResult> { self.query_statement(&Statement::new(sql)) }

    pub fn query_statement(&self, stmt: &Statement) -> BidsResult<QueryResult> {
        debug!(target: "bids_duckdb::engine", "query: {}", stmt.sql());
        let mut prepared = self.conn.prepare(stmt.sql())?;
        let mut rows = prepared.query(params_from_iter(stmt.params().iter()))?;
        let columns: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();
        let mut out = QueryResult { columns, rows: Vec::new() };
        while let Some(row) = rows.next()? {
            let mut vals = Vec::with_capacity(out.columns.len());
            for i in 0..out.columns.len() { vals.push(row.get::<_, Value>(i)?); }
            out.rows.push(vals);
        }
        Ok(out)
    }

    /// First column of the first row as an integer; `None` for no rows or a non-integer value.
    pub fn query_scalar_i64(&self, sql: &str) -> BidsResult<Option<i64>> {
        let res = self.query(sql)?;
        Ok(res.rows.first().and_then(|r| r.first()).and_then(value_to_i64))
    }

    /// Names of all tables and views, sorted.
    pub fn table_names(&self) -> BidsResult<Vec<String>> {
        let res = self.query("SHOW TABLES")?;
        let mut names: Vec<String> = (0..res.len()).filter_map(|i| res.text(i, "name")).collect();
        names.sort();
        Ok(names)
    }

    pub fn row_count(&self, table: &Ident) -> BidsResult<u64> {
        let n = self.query_scalar_i64(&format!("SELECT COUNT(*) FROM {}", table))?.unwrap_or(0);
        Ok(n.max(0) as u64)
    }

    /// Engine-reported storage estimate for all base tables, in bytes.
    pub fn estimated_size(&self) -> BidsResult<u64> {
        let n = self
            .query_scalar_i64("SELECT CAST(COALESCE(SUM(estimated_size), 0) AS BIGINT) FROM duckdb_tables()")?
            .unwrap_or(0);
        Ok(n.max(0) as u64)
    }

    pub fn appender(&self, table: &Ident) -> BidsResult<Appender<'_>> { Ok(self.conn.appender(table.as_str())?) }

    /// Register the scan function under `name`; `false` when this session already has it.
    pub fn register_scan_function(&self, name: &str) -> BidsResult<bool> {
        if self.functions.borrow().contains(name) {
            return Ok(false);
        }
        self.conn.register_table_function_with_extra_info::<ScanFunction, SourceRegistry>(name, &self.sources)?;
        self.functions.borrow_mut().insert(name.to_string());
        debug!(target: "bids_duckdb::engine", "registered table function {}", name);
        Ok(true)
    }

    pub fn has_table_function(&self, name: &str) -> bool { self.functions.borrow().contains(name) }

    pub fn sources(&self) -> &SourceRegistry { &self.sources }

    /// Expose `source` for `pattern` through the scan function `function`; returns the handle
    /// to pass as its argument.
    pub fn register_row_source(&self, function: &str, source: Arc<dyn RowSource>, pattern: &str) -> String {
        self.sources.register(function, source, pattern)
    }

    /// Record `handle` as the one backing `owner`, releasing the handle it replaces.
    pub fn attach_source(&self, owner: &str, handle: &str) {
        let previous = self.owners.borrow_mut().insert(owner.to_string(), handle.to_string());
        if let Some(old) = previous.filter(|h| h != handle) {
            self.sources.release(&old);
        }
    }
}
