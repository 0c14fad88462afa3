//! Host-lazy loading: row sources registered behind DuckDB table functions
//! and exposed as views. Creating the view only binds the function (column
//! discovery samples each matched file); rows are read when the view is
//! scanned. A file that fails to read is logged and skipped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use polars::prelude::*;
use tracing::{debug, info, warn};

use super::files::{match_files, read_json_document};
use super::{BidsLoader, LoaderCore, Strategy};
use crate::config::LoaderOptions;
use crate::engine::{is_safe_ident, CellValue, ColumnKind, Ident, RowIter, RowSource, ScanColumn, ScanRow, Session, Statement};
use crate::entities::{file_name_of, EntityNaming};
use crate::error::{BidsError, BidsResult};
use crate::schema::EntitySchema;

pub const TSV_FUNCTION: &str = "bids_scan_tsv";
pub const JSON_FUNCTION: &str = "bids_scan_json";

const FILEPATH: &str = "filepath";
const FILENAME: &str = "filename";
const JSON_CONTENT: &str = "json_content";

/// Read a whole TSV, inferring column types from the first `infer_rows` rows
/// (`Some(0)` reads every column as text, `None` infers from the whole file).
fn read_tsv(path: &Path, null_marker: &str, infer_rows: Option<usize>) -> PolarsResult<DataFrame> {
    let marker: PlSmallStr = null_marker.into();
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(infer_rows)
        .map_parse_options(|o| o.with_separator(b'\t').with_null_values(Some(NullValues::AllColumnsSingle(marker.clone()))))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

/// Typed read, falling back to all-text when a value does not fit the inferred type.
/// Errors only for files that cannot be parsed at all.
fn read_tsv_lenient(path: &Path, null_marker: &str, infer_rows: Option<usize>) -> PolarsResult<DataFrame> {
    match read_tsv(path, null_marker, infer_rows) {
        Ok(df) => Ok(df),
        Err(e) => {
            debug!(target: "bids_duckdb::loader", "typed read of {} failed ({}), reading as text", path.display(), e);
            read_tsv(path, null_marker, Some(0))
        }
    }
}

fn kind_of(dtype: &DataType) -> ColumnKind {
    if dtype.is_integer() {
        ColumnKind::Integer
    } else if dtype.is_float() {
        ColumnKind::Float
    } else if dtype == &DataType::Boolean {
        ColumnKind::Boolean
    } else {
        ColumnKind::Text
    }
}

/// Column-wise cells of `df`, converted per the column's kind.
fn frame_cells(df: &DataFrame) -> PolarsResult<Vec<(String, Vec<CellValue>)>> {
    let mut out = Vec::with_capacity(df.width());
    for col in df.get_columns() {
        let s = col.as_materialized_series();
        let cells: Vec<CellValue> = match kind_of(s.dtype()) {
            ColumnKind::Integer => s.cast(&DataType::Int64)?.i64()?.into_iter().map(|v| v.map(CellValue::Integer).unwrap_or(CellValue::Null)).collect(),
            ColumnKind::Float => s.cast(&DataType::Float64)?.f64()?.into_iter().map(|v| v.map(CellValue::Float).unwrap_or(CellValue::Null)).collect(),
            ColumnKind::Boolean => s.bool()?.into_iter().map(|v| v.map(CellValue::Boolean).unwrap_or(CellValue::Null)).collect(),
            ColumnKind::Text => s
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|v| v.map(|t| CellValue::Text(t.to_string())).unwrap_or(CellValue::Null))
                .collect(),
        };
        out.push((col.name().to_string(), cells));
    }
    Ok(out)
}

/// File identity plus entity columns shared by every row of one file.
fn file_row(path: &Path, naming: &EntityNaming) -> ScanRow {
    let mut row = ScanRow::new();
    row.insert(FILEPATH.to_string(), CellValue::Text(path.to_string_lossy().into_owned()));
    row.insert(FILENAME.to_string(), CellValue::Text(file_name_of(path)));
    for (col, value) in naming.entities_for(path) {
        row.insert(col, CellValue::Text(value));
    }
    row
}

fn entity_scan_columns(naming: &EntityNaming) -> Vec<ScanColumn> {
    naming.entity_columns().into_iter().map(|(_, col)| ScanColumn::text(col)).collect()
}

/// Rows of every tabular file, augmented with file identity and entities.
pub struct TabularScan {
    root: PathBuf,
    naming: EntityNaming,
    null_marker: String,
    sample_rows: usize,
}

/// Column names owned by the scan itself; native columns of the same name are dropped.
fn reserved_columns(naming: &EntityNaming) -> BTreeSet<String> {
    let mut out: BTreeSet<String> = naming.entity_columns().into_iter().map(|(_, c)| c).collect();
    out.insert(FILEPATH.to_string());
    out.insert(FILENAME.to_string());
    out
}

impl RowSource for TabularScan {
    fn columns(&self, pattern: &str) -> BidsResult<Vec<ScanColumn>> {
        let files = match_files(&self.root, pattern)?;
        let reserved = reserved_columns(&self.naming);
        let mut native: Vec<ScanColumn> = Vec::new();
        for path in &files {
            let df = match read_tsv_lenient(path, &self.null_marker, Some(self.sample_rows.max(1))) {
                Ok(df) => df,
                Err(e) => {
                    warn!(target: "bids_duckdb::loader", "failed to sample {}: {}", path.display(), e);
                    continue;
                }
            };
            for field in df.schema().iter_fields() {
                let (name, kind) = (field.name().to_string(), kind_of(field.dtype()));
                if reserved.contains(&name) { continue; }
                match native.iter_mut().find(|c| c.name == name) {
                    Some(c) => c.kind = c.kind.merge(kind),
                    None => native.push(ScanColumn::new(name, kind)),
                }
            }
        }
        debug!(target: "bids_duckdb::loader", "tabular scan: {} files, {} native columns", files.len(), native.len());
        let mut cols = vec![ScanColumn::text(FILEPATH), ScanColumn::text(FILENAME)];
        cols.extend(entity_scan_columns(&self.naming));
        cols.extend(native);
        Ok(cols)
    }

    fn produce(&self, pattern: &str) -> BidsResult<RowIter> {
        let files = match_files(&self.root, pattern)?;
        info!(target: "bids_duckdb::loader", "table_function: scanning {} tabular files", files.len());
        let naming = self.naming.clone();
        let reserved = reserved_columns(&naming);
        let null_marker = self.null_marker.clone();
        Ok(Box::new(files.into_iter().flat_map(move |path| {
            let read = read_tsv_lenient(&path, &null_marker, None).and_then(|df| frame_cells(&df).map(|c| (df.height(), c)));
            let cells = match read {
                Ok(v) => v,
                Err(e) => {
                    warn!(target: "bids_duckdb::loader", "failed to read {}: {}", path.display(), e);
                    (0, Vec::new())
                }
            };
            let base = file_row(&path, &naming);
            let (height, mut columns) = cells;
            columns.retain(|(name, _)| !reserved.contains(name));
            (0..height).map(move |i| {
                let mut row = base.clone();
                for (name, values) in &columns {
                    row.insert(name.clone(), values[i].clone());
                }
                row
            })
        })))
    }
}

/// One row per JSON sidecar holding its re-serialized content.
pub struct SidecarScan {
    root: PathBuf,
    naming: EntityNaming,
}

impl RowSource for SidecarScan {
    fn columns(&self, _pattern: &str) -> BidsResult<Vec<ScanColumn>> {
        let mut cols = vec![ScanColumn::text(FILEPATH), ScanColumn::text(FILENAME), ScanColumn::text(JSON_CONTENT)];
        cols.extend(entity_scan_columns(&self.naming));
        Ok(cols)
    }

    fn produce(&self, pattern: &str) -> BidsResult<RowIter> {
        let files = match_files(&self.root, pattern)?;
        info!(target: "bids_duckdb::loader", "table_function: scanning {} metadata files", files.len());
        let naming = self.naming.clone();
        Ok(Box::new(files.into_iter().map(move |path| {
            let content = read_json_document(&path).unwrap_or_else(|e| {
                warn!(target: "bids_duckdb::loader", "failed to read {}: {}", path.display(), e);
                "{}".to_string()
            });
            let mut row = file_row(&path, &naming);
            row.insert(JSON_CONTENT.to_string(), CellValue::Text(content));
            row
        })))
    }
}

pub struct TableFunctionLoader {
    core: LoaderCore,
}

impl TableFunctionLoader {
    pub fn new(root: &Path, schema: Arc<EntitySchema>, session: Option<Rc<Session>>, options: LoaderOptions) -> BidsResult<Self> {
        Ok(Self::from_core(LoaderCore::new(root, schema, session, options)?))
    }

    pub fn from_core(core: LoaderCore) -> Self { Self { core } }

    /// Register both scan functions on the session; repeated calls do nothing.
    pub fn register_functions(&self) -> BidsResult<()> {
        let session = self.core.session();
        let tsv = session.register_scan_function(TSV_FUNCTION)?;
        let json = session.register_scan_function(JSON_FUNCTION)?;
        if tsv || json {
            info!(target: "bids_duckdb::loader", "registered {} and {}", TSV_FUNCTION, JSON_FUNCTION);
        }
        Ok(())
    }

    fn create_view(&self, view: &Ident, function: &str, source: Arc<dyn RowSource>, pattern: &str) -> BidsResult<String> {
        self.register_functions()?;
        let handle = self.core.session().register_row_source(function, source, pattern);
        if !is_safe_ident(&handle) {
            return Err(BidsError::InvalidIdentifier(handle));
        }
        // views cannot carry bound parameters; the handle is an allow-listed token
        let mut stmt = Statement::new("CREATE OR REPLACE VIEW ");
        stmt.push_ident(view).push_sql(&format!(" AS SELECT * FROM {}('{}')", function, handle));
        info!(target: "bids_duckdb::loader", "table_function: creating view {} over '{}'", view.as_str(), pattern);
        self.core.session().execute(&stmt)?;
        self.core.session().attach_source(view.as_str(), &handle);
        Ok(view.as_str().to_string())
    }

    /// Snapshot `view` into `<view>_materialized`, replacing any earlier snapshot.
    pub fn materialize_view(&self, view: &str) -> BidsResult<String> {
        let source = Ident::new(view)?;
        let target = Ident::new(format!("{}_materialized", view))?;
        let mut stmt = Statement::new("CREATE OR REPLACE TABLE ");
        stmt.push_ident(&target).push_sql(" AS SELECT * FROM ").push_ident(&source);
        self.core.session().execute(&stmt)?;
        let n = self.core.session().row_count(&target)?;
        info!(target: "bids_duckdb::loader", "materialized {} rows from {} into {}", n, view, target.as_str());
        Ok(target.as_str().to_string())
    }
}

impl BidsLoader for TableFunctionLoader {
    fn core(&self) -> &LoaderCore { &self.core }

    fn strategy(&self) -> Strategy { Strategy::TableFunction }

    fn load_tabular(&self, pattern: &str) -> BidsResult<String> {
        let view = self.core.table_ident(&self.core.options().tabular_table)?;
        let source = TabularScan {
            root: self.core.root().to_path_buf(),
            naming: self.core.naming().clone(),
            null_marker: self.core.options().null_marker.clone(),
            sample_rows: self.core.options().sample_rows,
        };
        self.create_view(&view, TSV_FUNCTION, Arc::new(source), pattern)
    }

    fn load_metadata(&self, pattern: &str) -> BidsResult<String> {
        let view = self.core.table_ident(&self.core.options().metadata_table)?;
        let source = SidecarScan { root: self.core.root().to_path_buf(), naming: self.core.naming().clone() };
        self.create_view(&view, JSON_FUNCTION, Arc::new(source), pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(&p, body).unwrap();
        p
    }

    fn scan(root: &Path) -> TabularScan {
        TabularScan { root: root.to_path_buf(), naming: EntityNaming::new(&EntitySchema::fallback(), true), null_marker: "n/a".into(), sample_rows: 100 }
    }

    #[test]
    fn columns_merge_kinds_across_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub-01/sub-01_task-a_events.tsv", "onset\tvalue\n1\t2\n");
        write(tmp.path(), "sub-02/sub-02_task-a_events.tsv", "onset\tvalue\textra\n1.5\tx\ty\n");
        let cols = scan(tmp.path()).columns("**/*.tsv").unwrap();
        let find = |n: &str| cols.iter().find(|c| c.name == n).map(|c| c.kind);
        assert_eq!(find("onset"), Some(ColumnKind::Float));
        assert_eq!(find("value"), Some(ColumnKind::Text));
        assert_eq!(find("extra"), Some(ColumnKind::Text));
        assert_eq!(find("subject"), Some(ColumnKind::Text));
        assert_eq!(cols[0].name, FILEPATH);
        assert_eq!(cols[1].name, FILENAME);
    }

    #[test]
    fn rows_carry_file_entities_and_null_marker() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub-01/sub-01_task-a_events.tsv", "onset\ttrial_type\n1\tgo\n2\tn/a\n");
        let rows: Vec<ScanRow> = scan(tmp.path()).produce("**/*.tsv").unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("subject"), Some(&CellValue::Text("01".into())));
        assert_eq!(rows[0].get("task"), Some(&CellValue::Text("a".into())));
        assert_eq!(rows[0].get("session"), None);
        assert_eq!(rows[0].get(FILENAME), Some(&CellValue::Text("sub-01_task-a_events.tsv".into())));
        assert_eq!(rows[1].get("trial_type"), Some(&CellValue::Null));
    }

    #[test]
    fn late_type_change_falls_back_to_text() {
        let tmp = tempfile::tempdir().unwrap();
        let mut body = String::from("onset\tcode\n");
        for i in 0..150 {
            body.push_str(&format!("{}\t{}\n", i, i));
        }
        body.push_str("150\tabc\n");
        write(tmp.path(), "sub-01/sub-01_task-a_events.tsv", &body);
        let src = scan(tmp.path());
        let cols = src.columns("**/*.tsv").unwrap();
        let find = |n: &str| cols.iter().find(|c| c.name == n).map(|c| c.kind);
        assert_eq!(find("onset"), Some(ColumnKind::Text));
        assert_eq!(find("code"), Some(ColumnKind::Text));
        let rows: Vec<ScanRow> = src.produce("**/*.tsv").unwrap().collect();
        assert_eq!(rows.len(), 151);
        assert_eq!(rows[150].get("code"), Some(&CellValue::Text("abc".into())));
    }

    #[test]
    fn reserved_native_columns_are_dropped_from_rows() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub-01/sub-01_scans.tsv", "onset\trun\tfilename\n1\t7\tx.nii\n");
        let src = scan(tmp.path());
        let cols = src.columns("**/*.tsv").unwrap();
        assert_eq!(cols.iter().filter(|c| c.name == "run" || c.name == FILENAME).count(), 2);
        let rows: Vec<ScanRow> = src.produce("**/*.tsv").unwrap().collect();
        assert_eq!(rows[0].get("run"), None);
        assert_eq!(rows[0].get(FILENAME), Some(&CellValue::Text("sub-01_scans.tsv".into())));
        assert_eq!(rows[0].get("onset"), Some(&CellValue::Integer(1)));
    }

    #[test]
    fn unreadable_sidecar_becomes_empty_object() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub-01/sub-01_bold.json", "{\"a\": 1}");
        write(tmp.path(), "sub-02/sub-02_bold.json", "{broken");
        let src = SidecarScan { root: tmp.path().to_path_buf(), naming: EntityNaming::new(&EntitySchema::fallback(), false) };
        let rows: Vec<ScanRow> = src.produce("**/*.json").unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(JSON_CONTENT), Some(&CellValue::Text("{\"a\":1}".into())));
        assert_eq!(rows[1].get(JSON_CONTENT), Some(&CellValue::Text("{}".into())));
        assert_eq!(rows[1].get("sub"), Some(&CellValue::Text("02".into())));
    }
}
