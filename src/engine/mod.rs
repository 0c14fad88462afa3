//! DuckDB engine boundary: sessions, the statement builder, query results
//! and Rust-backed table functions.

pub mod functions;
pub mod result;
pub mod session;
pub mod sql;

pub use functions::{CellValue, ColumnKind, RowIter, RowSource, ScanColumn, ScanFunction, ScanRow, SourceRegistry};
pub use result::{value_to_i64, value_to_text, QueryResult};
pub use session::Session;
pub use sql::{is_safe_ident, Ident, Statement};
