//! Row-producing table functions backed by Rust sources.
//!
//! A `RowSource` describes its columns for a pattern and produces a fresh,
//! finite sequence of rows each time it is asked. Sources are registered in a
//! per-session `SourceRegistry` under a generated handle; the engine sees a table
//! function (`ScanFunction`) whose only argument is that handle. Binding
//! resolves the handle and declares the columns, execution pulls rows in
//! chunks. Every query re-binds and re-initialises, so scans restart.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::Arc;

use duckdb::core::{DataChunkHandle, Inserter, LogicalTypeHandle, LogicalTypeId};
use duckdb::vtab::{BindInfo, InitInfo, TableFunctionInfo, VTab};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{BidsError, BidsResult};

/// Rows written per output chunk (DuckDB's standard vector size).
pub const CHUNK_ROWS: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnKind {
    /// Widest kind able to hold values of both.
    pub fn merge(self, other: ColumnKind) -> ColumnKind {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }

    fn logical_type(self) -> LogicalTypeHandle {
        match self {
            ColumnKind::Integer => LogicalTypeHandle::from(LogicalTypeId::Bigint),
            ColumnKind::Float => LogicalTypeHandle::from(LogicalTypeId::Double),
            ColumnKind::Boolean => LogicalTypeHandle::from(LogicalTypeId::Boolean),
            ColumnKind::Text => LogicalTypeHandle::from(LogicalTypeId::Varchar),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl ScanColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self { Self { name: name.into(), kind } }

    pub fn text(name: impl Into<String>) -> Self { Self::new(name, ColumnKind::Text) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl CellValue {
    /// Convert to the declared column kind; values that cannot convert become null.
    pub fn coerce(&self, kind: ColumnKind) -> CellValue {
        match (self, kind) {
            (CellValue::Null, _) => CellValue::Null,
            (CellValue::Integer(n), ColumnKind::Integer) => CellValue::Integer(*n),
            (CellValue::Integer(n), ColumnKind::Float) => CellValue::Float(*n as f64),
            (CellValue::Float(f), ColumnKind::Float) => CellValue::Float(*f),
            (CellValue::Boolean(b), ColumnKind::Boolean) => CellValue::Boolean(*b),
            (CellValue::Text(s), ColumnKind::Integer) => s.trim().parse().map(CellValue::Integer).unwrap_or(CellValue::Null),
            (CellValue::Text(s), ColumnKind::Float) => s.trim().parse().map(CellValue::Float).unwrap_or(CellValue::Null),
            (CellValue::Text(s), ColumnKind::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => CellValue::Boolean(true),
                "false" => CellValue::Boolean(false),
                _ => CellValue::Null,
            },
            (v, ColumnKind::Text) => v.as_text().map(CellValue::Text).unwrap_or(CellValue::Null),
            _ => CellValue::Null,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Integer(n) => Some(n.to_string()),
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::Boolean(b) => Some(b.to_string()),
            CellValue::Text(s) => Some(s.clone()),
        }
    }
}

/// One produced row: column name -> value. Columns missing from a row are null.
pub type ScanRow = BTreeMap<String, CellValue>;

pub type RowIter = Box<dyn Iterator<Item = ScanRow> + Send>;

pub trait RowSource: Send + Sync {
    /// Output columns for `pattern`, in order.
    fn columns(&self, pattern: &str) -> BidsResult<Vec<ScanColumn>>;
    /// A fresh lazy sequence of rows for `pattern`.
    fn produce(&self, pattern: &str) -> BidsResult<RowIter>;
}

struct ScanBinding {
    source: Arc<dyn RowSource>,
    pattern: String,
}

/// Handle -> registered source, shared between one session and the scan
/// functions registered on it.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<RwLock<HashMap<String, Arc<ScanBinding>>>>,
}

impl SourceRegistry {
    /// Register `source` for `pattern` under a new handle prefixed with `function`.
    pub fn register(&self, function: &str, source: Arc<dyn RowSource>, pattern: &str) -> String {
        let handle = format!("{}_{}", function, uuid::Uuid::new_v4().simple());
        let binding = Arc::new(ScanBinding { source, pattern: pattern.to_string() });
        self.sources.write().insert(handle.clone(), binding);
        debug!(target: "bids_duckdb::engine", "registered scan source handle={} pattern='{}'", handle, pattern);
        handle
    }

    pub fn release(&self, handle: &str) {
        if self.sources.write().remove(handle).is_some() {
            debug!(target: "bids_duckdb::engine", "released scan source handle={}", handle);
        }
    }

    pub fn is_registered(&self, handle: &str) -> bool { self.sources.read().contains_key(handle) }

    pub fn len(&self) -> usize { self.sources.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn lookup(&self, handle: &str) -> BidsResult<Arc<ScanBinding>> {
        self.sources.read().get(handle).cloned().ok_or_else(|| BidsError::UnknownScanHandle(handle.to_string()))
    }
}

pub struct ScanBindData {
    binding: Arc<ScanBinding>,
    columns: Vec<ScanColumn>,
}

pub struct ScanInitData {
    rows: Mutex<Option<RowIter>>,
}

/// Table function `fn(handle VARCHAR)` streaming a registered `RowSource`.
/// Must be registered with a `SourceRegistry` as extra info.
pub struct ScanFunction;

impl VTab for ScanFunction {
    type InitData = ScanInitData;
    type BindData = ScanBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        let ptr = bind.get_extra_info::<SourceRegistry>();
        if ptr.is_null() {
            return Err("scan function registered without a source registry".into());
        }
        // set at registration; the catalog keeps it alive as long as the function
        let registry = unsafe { &*ptr };
        let handle = bind.get_parameter(0).to_string();
        let binding = registry.lookup(&handle)?;
        let columns = binding.source.columns(&binding.pattern)?;
        for col in &columns {
            bind.add_result_column(&col.name, col.kind.logical_type());
        }
        debug!(target: "bids_duckdb::engine", "bound scan handle={} columns={}", handle, columns.len());
        Ok(ScanBindData { binding, columns })
    }

    fn init(_: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        Ok(ScanInitData { rows: Mutex::new(None) })
    }

    fn func(func: &TableFunctionInfo<Self>, output: &mut DataChunkHandle) -> Result<(), Box<dyn Error>> {
        let bind = func.get_bind_data();
        let init = func.get_init_data();
        let mut guard = init.rows.lock();
        if guard.is_none() {
            *guard = Some(bind.binding.source.produce(&bind.binding.pattern)?);
        }
        let Some(rows) = guard.as_mut() else {
            output.set_len(0);
            return Ok(());
        };
        let batch: Vec<ScanRow> = rows.by_ref().take(CHUNK_ROWS).collect();
        for (col_idx, col) in bind.columns.iter().enumerate() {
            let mut vector = output.flat_vector(col_idx);
            for (row_idx, row) in batch.iter().enumerate() {
                let cell = row.get(&col.name).map(|v| v.coerce(col.kind)).unwrap_or(CellValue::Null);
                match cell {
                    CellValue::Null => vector.set_null(row_idx),
                    CellValue::Integer(n) => vector.as_mut_slice::<i64>()[row_idx] = n,
                    CellValue::Float(f) => vector.as_mut_slice::<f64>()[row_idx] = f,
                    CellValue::Boolean(b) => vector.as_mut_slice::<bool>()[row_idx] = b,
                    CellValue::Text(s) => vector.insert(row_idx, s.as_str()),
                }
            }
        }
        output.set_len(batch.len());
        Ok(())
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        Some(vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)])
    }
}
