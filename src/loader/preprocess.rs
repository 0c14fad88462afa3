//! Host-eager loading: files are enumerated and their entities extracted on
//! the host, then one `read_csv` fragment per file (entity values bound as
//! parameters) is unioned by name and materialized in a single statement.
//! A file that fails to parse aborts the whole load.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use duckdb::appender_params_from_iter;
use duckdb::types::Value;
use tracing::{debug, info, warn};

use super::files::{match_files, read_json_document};
use super::{BidsLoader, LoaderCore, Strategy};
use crate::config::LoaderOptions;
use crate::engine::{Ident, Session, Statement};
use crate::entities::file_name_of;
use crate::error::BidsResult;
use crate::schema::EntitySchema;

pub const PARTICIPANTS_FILE: &str = "participants.tsv";

pub struct PreprocessLoader {
    core: LoaderCore,
}

impl PreprocessLoader {
    pub fn new(root: &Path, schema: Arc<EntitySchema>, session: Option<Rc<Session>>, options: LoaderOptions) -> BidsResult<Self> {
        Ok(Self::from_core(LoaderCore::new(root, schema, session, options)?))
    }

    pub fn from_core(core: LoaderCore) -> Self { Self { core } }

    /// `read_csv(?, ...)` over one file with the configured null marker.
    fn read_csv(&self, path: &Path) -> Statement {
        let mut stmt = Statement::new("read_csv(");
        stmt.push_text(&path.to_string_lossy())
            .push_sql(", delim = '\\t', header = true, auto_detect = true, nullstr = ")
            .push_text(&self.core.options().null_marker)
            .push_sql(")");
        stmt
    }

    /// `SELECT <filepath>, <filename>, <entities...>, <native columns> FROM read_csv(file)`.
    fn file_fragment(&self, path: &Path, entity_cols: &[(String, Ident)], reserved: &[Ident]) -> Statement {
        let entities = self.core.parse_entities(path);
        let mut stmt = Statement::new("SELECT ");
        stmt.push_varchar(Some(&path.to_string_lossy())).push_sql(" AS \"filepath\", ");
        stmt.push_varchar(Some(&file_name_of(path))).push_sql(" AS \"filename\"");
        for (short, col) in entity_cols {
            stmt.push_sql(", ").push_varchar(entities.get(short).map(String::as_str)).push_sql(" AS ").push_ident(col);
        }
        stmt.push_sql(", ").push_columns_except(reserved).push_sql(" FROM ").push_statement(self.read_csv(path));
        stmt
    }

    fn create_placeholder(&self, table: &Ident) -> BidsResult<()> {
        let mut stmt = Statement::new("CREATE OR REPLACE TABLE ");
        stmt.push_ident(table).push_sql(" (\"filepath\" VARCHAR)");
        self.core.session().execute(&stmt)?;
        Ok(())
    }

    fn matched(&self, pattern: &str) -> BidsResult<Vec<PathBuf>> {
        let files = match_files(self.core.root(), pattern)?;
        info!(target: "bids_duckdb::loader", "preprocess: found {} files matching '{}'", files.len(), pattern);
        Ok(files)
    }

    /// Load `participants.tsv` at the dataset root; `None` when the file is absent.
    pub fn load_participants(&self) -> BidsResult<Option<String>> {
        let path = self.core.root().join(PARTICIPANTS_FILE);
        if !path.is_file() {
            warn!(target: "bids_duckdb::loader", "{} not found under {}", PARTICIPANTS_FILE, self.core.root().display());
            return Ok(None);
        }
        let table = self.core.table_ident(&self.core.options().participants_table)?;
        let mut stmt = Statement::new("CREATE OR REPLACE TABLE ");
        stmt.push_ident(&table).push_sql(" AS SELECT * FROM ").push_statement(self.read_csv(&path));
        self.core.session().execute(&stmt)?;
        let n = self.core.session().row_count(&table)?;
        info!(target: "bids_duckdb::loader", "preprocess: loaded {} participants into {}", n, table.as_str());
        Ok(Some(table.as_str().to_string()))
    }
}

impl BidsLoader for PreprocessLoader {
    fn core(&self) -> &LoaderCore { &self.core }

    fn strategy(&self) -> Strategy { Strategy::Preprocess }

    fn load_tabular(&self, pattern: &str) -> BidsResult<String> {
        let table = self.core.table_ident(&self.core.options().tabular_table)?;
        let files = self.matched(pattern)?;
        if files.is_empty() {
            warn!(target: "bids_duckdb::loader", "preprocess: no tabular files, creating empty {}", table.as_str());
            self.create_placeholder(&table)?;
            return Ok(table.as_str().to_string());
        }
        let entity_cols = self.core.entity_idents()?;
        let reserved = self.core.reserved_idents()?;
        let parts: Vec<Statement> = files.iter().map(|p| self.file_fragment(p, &entity_cols, &reserved)).collect();
        let mut stmt = Statement::new("CREATE OR REPLACE TABLE ");
        stmt.push_ident(&table).push_sql(" AS ").push_statement(Statement::join(parts, " UNION ALL BY NAME "));
        debug!(target: "bids_duckdb::loader", "preprocess: union of {} fragments, {} chars, {} params", files.len(), stmt.sql().len(), stmt.params().len());
        self.core.session().execute(&stmt)?;
        let n = self.core.session().row_count(&table)?;
        info!(target: "bids_duckdb::loader", "preprocess: loaded {} rows into {}", n, table.as_str());
        Ok(table.as_str().to_string())
    }

    fn load_metadata(&self, pattern: &str) -> BidsResult<String> {
        let table = self.core.table_ident(&self.core.options().metadata_table)?;
        let files = self.matched(pattern)?;
        if files.is_empty() {
            warn!(target: "bids_duckdb::loader", "preprocess: no metadata files, creating empty {}", table.as_str());
            self.create_placeholder(&table)?;
            return Ok(table.as_str().to_string());
        }
        let entity_cols = self.core.entity_idents()?;
        let mut ddl = Statement::new("CREATE OR REPLACE TABLE ");
        ddl.push_ident(&table).push_sql(" (\"filepath\" VARCHAR, \"filename\" VARCHAR, \"json_content\" VARCHAR");
        for (_, col) in &entity_cols {
            ddl.push_sql(", ").push_ident(col).push_sql(" VARCHAR");
        }
        ddl.push_sql(")");
        self.core.session().execute(&ddl)?;

        let session = self.core.session();
        let mut appender = session.appender(&table)?;
        for path in &files {
            let content = read_json_document(path).unwrap_or_else(|e| {
                warn!(target: "bids_duckdb::loader", "failed to read {}: {}", path.display(), e);
                "{}".to_string()
            });
            let entities = self.core.parse_entities(path);
            let mut row = vec![
                Value::Text(path.to_string_lossy().into_owned()),
                Value::Text(file_name_of(path)),
                Value::Text(content),
            ];
            for (short, _) in &entity_cols {
                row.push(entities.get(short).map(|v| Value::Text(v.clone())).unwrap_or(Value::Null));
            }
            appender.append_row(appender_params_from_iter(row.iter()))?;
        }
        appender.flush()?;
        drop(appender);
        let n = session.row_count(&table)?;
        info!(target: "bids_duckdb::loader", "preprocess: loaded {} metadata files into {}", n, table.as_str());
        Ok(table.as_str().to_string())
    }
}
