//! Engine-native loading: DuckDB reads every matching file in one pass and
//! derives the entity columns from the file's basename. The basename is split
//! into `key-value` tokens exactly as on the host, the tokens are joined with
//! `/`, and a bound per-key pattern picks the value of the last matching token.

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info};

use super::files::engine_glob;
use super::{BidsLoader, LoaderCore, Strategy};
use crate::config::LoaderOptions;
use crate::engine::{Ident, Session, Statement};
use crate::error::{BidsError, BidsResult};
use crate::schema::EntitySchema;

/// Basename of the engine's raw `filename` column.
const BASENAME: &str = "parse_filename(\"filename\")";

/// Entity tokens of the basename, joined with `/`.
const ENTITY_TOKENS: &str =
    "array_to_string(regexp_extract_all(parse_filename(\"filename\"), '[a-zA-Z0-9]+-[a-zA-Z0-9]+'), '/')";

pub struct SqlRegexLoader {
    core: LoaderCore,
}

/// Pattern over `/`-joined entity tokens capturing the value of the last token keyed
/// `short_name`.
pub fn entity_pattern(short_name: &str) -> String {
    format!("^(?:.*/)?{}-([a-zA-Z0-9]+)(?:/.*)?$", regex::escape(short_name))
}

impl SqlRegexLoader {
    pub fn new(root: &Path, schema: Arc<EntitySchema>, session: Option<Rc<Session>>, options: LoaderOptions) -> BidsResult<Self> {
        Ok(Self::from_core(LoaderCore::new(root, schema, session, options)?))
    }

    pub fn from_core(core: LoaderCore) -> Self { Self { core } }

    /// `, NULLIF(regexp_extract(tokens, ?, 1), '') AS "col"` for every schema entity.
    fn entity_projection(&self) -> BidsResult<Statement> {
        let mut out = Statement::default();
        for (short, col) in self.core.entity_idents()? {
            let mut expr = Statement::new("NULLIF(regexp_extract(");
            expr.push_sql(ENTITY_TOKENS).push_sql(", ").push_text(&entity_pattern(&short)).push_sql(", 1), '')");
            out.push_sql(", ").push_aliased(expr, &col);
        }
        Ok(out)
    }

    fn run(&self, table: &Ident, stmt: &Statement, glob: &str) -> BidsResult<()> {
        match self.core.session().execute(stmt) {
            Ok(_) => Ok(()),
            Err(BidsError::Engine(e)) if e.to_string().contains("No files found") => {
                debug!(target: "bids_duckdb::loader", "engine reported no files for {}: {}", table, e);
                Err(BidsError::NoMatchingFiles { pattern: glob.to_string() })
            }
            Err(e) => Err(e),
        }
    }
}

impl BidsLoader for SqlRegexLoader {
    fn core(&self) -> &LoaderCore { &self.core }

    fn strategy(&self) -> Strategy { Strategy::Sql }

    fn load_tabular(&self, pattern: &str) -> BidsResult<String> {
        let table = self.core.table_ident(&self.core.options().tabular_table)?;
        let glob = engine_glob(self.core.root(), pattern);
        let mut stmt = Statement::new("CREATE OR REPLACE TABLE ");
        stmt.push_ident(&table)
            .push_sql(" AS SELECT ")
            .push_columns_except(&self.core.reserved_idents()?)
            .push_sql(", \"filename\" AS \"filepath\", ")
            .push_sql(BASENAME)
            .push_sql(" AS \"filename\"")
            .push_statement(self.entity_projection()?)
            .push_sql(" FROM read_csv(")
            .push_text(&glob)
            .push_sql(", delim = '\\t', header = true, auto_detect = true, nullstr = ")
            .push_text(&self.core.options().null_marker)
            .push_sql(", union_by_name = true, filename = true)");
        info!(target: "bids_duckdb::loader", "sql: loading tabular files from {}", glob);
        self.run(&table, &stmt, &glob)?;
        let n = self.core.session().row_count(&table)?;
        info!(target: "bids_duckdb::loader", "sql: loaded {} rows into {}", n, table.as_str());
        Ok(table.as_str().to_string())
    }

    fn load_metadata(&self, pattern: &str) -> BidsResult<String> {
        let table = self.core.table_ident(&self.core.options().metadata_table)?;
        let glob = engine_glob(self.core.root(), pattern);
        let mut stmt = Statement::new("CREATE OR REPLACE TABLE ");
        stmt.push_ident(&table)
            .push_sql(" AS SELECT \"filename\" AS \"filepath\", ")
            .push_sql(BASENAME)
            .push_sql(" AS \"filename\", \"content\" AS \"json_content\"")
            .push_statement(self.entity_projection()?)
            .push_sql(" FROM read_text(")
            .push_text(&glob)
            .push_sql(")");
        info!(target: "bids_duckdb::loader", "sql: loading metadata files from {}", glob);
        self.run(&table, &stmt, &glob)?;
        let n = self.core.session().row_count(&table)?;
        info!(target: "bids_duckdb::loader", "sql: loaded {} metadata files into {}", n, table.as_str());
        Ok(table.as_str().to_string())
    }
}
