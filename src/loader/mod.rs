//! Loaders turning a BIDS tree into engine tables.
//!
//! Three strategies implement `BidsLoader`:
//! - `sql`: the engine reads every matching file itself and extracts entities
//!   with `regexp_extract` over the captured filename column.
//! - `preprocess`: the host walks files, extracts entities and unions one
//!   statement per file into an eagerly materialized table.
//! - `table_function`: the host registers row sources behind a table
//!   function and exposes them as lazy views.
//!
//! Shared behaviour (root validation, entity naming, queries and statistics)
//! lives in `LoaderCore`, which each loader owns.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::debug;

use crate::config::LoaderOptions;
use crate::engine::{Ident, QueryResult, Session};
use crate::entities::{extract_entities, file_name_of, EntityNaming};
use crate::error::{BidsError, BidsResult};
use crate::schema::EntitySchema;

pub mod files;
pub mod preprocess;
pub mod sql_regex;
pub mod table_function;

pub use preprocess::PreprocessLoader;
pub use sql_regex::SqlRegexLoader;
pub use table_function::TableFunctionLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Strategy {
    Sql,
    Preprocess,
    TableFunction,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Sql, Strategy::Preprocess, Strategy::TableFunction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sql => "sql",
            Strategy::Preprocess => "preprocess",
            Strategy::TableFunction => "table_function",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Strategy {
    type Err = BidsError;

    /// `python` is accepted as an older name of `preprocess`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Strategy::Sql),
            "preprocess" | "python" => Ok(Strategy::Preprocess),
            "table_function" => Ok(Strategy::TableFunction),
            _ => Err(BidsError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Per-table row counts of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoaderStatistics {
    pub tables: BTreeMap<String, u64>,
}

/// State and helpers shared by every loader.
pub struct LoaderCore {
    root: PathBuf,
    schema: Arc<EntitySchema>,
    naming: EntityNaming,
    session: Rc<Session>,
    options: LoaderOptions,
}

impl LoaderCore {
    /// Fails with `RootNotFound` when `root` does not exist. Without a session a
    /// fresh in-memory one is opened.
    pub fn new(root: &Path, schema: Arc<EntitySchema>, session: Option<Rc<Session>>, options: LoaderOptions) -> BidsResult<Self> {
        if !root.exists() {
            return Err(BidsError::RootNotFound(root.to_path_buf()));
        }
        let session = match session {
            Some(s) => s,
            None => Rc::new(Session::open_in_memory()?),
        };
        let naming = EntityNaming::new(&schema, options.use_full_names);
        Ok(Self { root: root.to_path_buf(), schema, naming, session, options })
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn schema(&self) -> &Arc<EntitySchema> { &self.schema }
    pub fn naming(&self) -> &EntityNaming { &self.naming }
    pub fn session(&self) -> &Rc<Session> { &self.session }
    pub fn options(&self) -> &LoaderOptions { &self.options }

    /// Short name -> value for the entities in the basename of `path`.
    pub fn parse_entities(&self, path: &Path) -> BTreeMap<String, String> {
        extract_entities(&file_name_of(path), self.naming.short_names())
    }

    pub fn get_entity_full_name<'a>(&'a self, short_name: &'a str) -> &'a str { self.naming.full_name(short_name) }

    pub fn get_entity_column_name<'a>(&'a self, short_name: &'a str, use_full_names: bool) -> &'a str {
        self.naming.column_name_as(short_name, use_full_names)
    }

    /// (short name, validated column identifier) for every schema entity.
    pub fn entity_idents(&self) -> BidsResult<Vec<(String, Ident)>> {
        self.naming.entity_columns().into_iter().map(|(short, col)| Ok((short, Ident::new(col)?))).collect()
    }

    /// `filepath`, `filename` and every entity column; native columns with these
    /// names are dropped.
    pub fn reserved_idents(&self) -> BidsResult<Vec<Ident>> {
        let mut out = vec![Ident::new("filepath")?, Ident::new("filename")?];
        out.extend(self.entity_idents()?.into_iter().map(|(_, col)| col));
        Ok(out)
    }

    pub fn table_ident(&self, name: &str) -> BidsResult<Ident> { Ident::new(name) }

    pub fn query(&self, sql: &str) -> BidsResult<QueryResult> { self.session.query(sql) }

    pub fn query_df(&self, sql: &str) -> BidsResult<DataFrame> { self.session.query(sql)?.to_dataframe() }

    pub fn get_table_names(&self) -> BidsResult<Vec<String>> { self.session.table_names() }

    pub fn get_statistics(&self) -> BidsResult<LoaderStatistics> {
        let mut stats = LoaderStatistics::default();
        for name in self.get_table_names()? {
            let Ok(ident) = Ident::new(name.as_str()) else {
                debug!(target: "bids_duckdb::loader", "statistics: skipping table with unquotable name '{}'", name);
                continue;
            };
            stats.tables.insert(name, self.session.row_count(&ident)?);
        }
        Ok(stats)
    }
}

/// One way of loading a BIDS tree. Loads return the name of the created table or view
/// and replace any same-named object.
pub trait BidsLoader {
    fn core(&self) -> &LoaderCore;

    fn strategy(&self) -> Strategy;

    fn load_tabular(&self, pattern: &str) -> BidsResult<String>;

    fn load_metadata(&self, pattern: &str) -> BidsResult<String>;

    fn query(&self, sql: &str) -> BidsResult<QueryResult> { self.core().query(sql) }

    fn query_df(&self, sql: &str) -> BidsResult<DataFrame> { self.core().query_df(sql) }

    fn get_table_names(&self) -> BidsResult<Vec<String>> { self.core().get_table_names() }

    fn get_statistics(&self) -> BidsResult<LoaderStatistics> { self.core().get_statistics() }
}

pub fn create_loader(
    strategy: Strategy,
    root: &Path,
    schema: Arc<EntitySchema>,
    session: Option<Rc<Session>>,
    options: LoaderOptions,
) -> BidsResult<Box<dyn BidsLoader>> {
    let core = LoaderCore::new(root, schema, session, options)?;
    Ok(match strategy {
        Strategy::Sql => Box::new(SqlRegexLoader::from_core(core)),
        Strategy::Preprocess => Box::new(PreprocessLoader::from_core(core)),
        Strategy::TableFunction => Box::new(TableFunctionLoader::from_core(core)),
    })
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod loader_tests;
