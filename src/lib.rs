//! Load BIDS datasets into DuckDB and compare three loading strategies.

pub mod benchmark;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod entities;
pub mod error;
pub mod loader;
pub mod schema;

pub use benchmark::{run_benchmark, BenchmarkResult, BenchmarkSuite};
pub use config::{BenchConfig, LoaderOptions, SchemaConfig};
pub use engine::{QueryResult, Session};
pub use entities::{extract_entities, EntityNaming};
pub use error::{BidsError, BidsResult};
pub use loader::{create_loader, BidsLoader, PreprocessLoader, SqlRegexLoader, Strategy, TableFunctionLoader};
pub use schema::{EntityDefinition, EntitySchema, SchemaSource};
