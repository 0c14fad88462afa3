use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use bids_duckdb::benchmark::{summary, BenchmarkSuite};
use bids_duckdb::config::{BenchConfig, LoaderOptions, SchemaConfig, DEFAULT_METADATA_PATTERN, DEFAULT_TABULAR_PATTERN};
use bids_duckdb::dataset::{write_fixture, write_synthetic, SyntheticSpec};
use bids_duckdb::loader::{BidsLoader, PreprocessLoader, SqlRegexLoader, Strategy, TableFunctionLoader};
use bids_duckdb::{EntitySchema, Session};

#[derive(Parser)]
#[command(name = "bids-duckdb", version, about = "Load BIDS datasets into DuckDB and compare loading strategies")]
struct Cli {
    #[command(flatten)]
    schema: SchemaArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SchemaArgs {
    /// BIDS specification branch or tag to fetch the entity table from
    #[arg(long, global = true, env = "BIDS_SCHEMA_VERSION")]
    schema_version: Option<String>,
    /// Use the built-in entity table without touching the network
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the entities known to the schema
    Entities,
    /// Write a BIDS-like dataset
    Generate {
        dir: PathBuf,
        /// Write the small two-subject fixture instead of a synthetic tree
        #[arg(long)]
        fixture: bool,
        #[arg(long, default_value_t = 10)]
        subjects: usize,
        #[arg(long, default_value_t = 2)]
        sessions: usize,
        #[arg(long, default_value_t = 2)]
        runs: usize,
        #[arg(long, default_value_t = 50)]
        rows: usize,
    },
    /// Load a dataset with one strategy and optionally run a query
    Load {
        root: PathBuf,
        #[arg(long, default_value = "sql")]
        strategy: String,
        #[arg(long, default_value = DEFAULT_TABULAR_PATTERN)]
        pattern: String,
        /// Also load JSON sidecars matching this pattern
        #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_METADATA_PATTERN)]
        metadata: Option<String>,
        /// Name entity columns by short name (`sub`) instead of full name (`subject`)
        #[arg(long)]
        short_names: bool,
        /// Load participants.tsv too (preprocess strategy)
        #[arg(long)]
        participants: bool,
        /// Snapshot the lazy view into a table (table_function strategy)
        #[arg(long)]
        materialize: bool,
        /// DuckDB database file; in-memory when omitted
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Benchmark the strategies against one dataset
    Bench {
        root: PathBuf,
        #[arg(long, value_delimiter = ',')]
        strategies: Vec<String>,
        #[arg(long)]
        pattern: Option<String>,
        /// YAML or JSON file with strategies, pattern and named queries
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print results as JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },
}

fn load_schema(args: &SchemaArgs) -> Arc<EntitySchema> {
    let mut cfg = SchemaConfig::from_env();
    if let Some(v) = &args.schema_version { cfg.version = v.clone(); }
    if args.offline { cfg.offline = true; }
    Arc::new(EntitySchema::load(&cfg))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Entities => {
            let schema = load_schema(&cli.schema);
            println!("schema version: {} ({:?})", schema.version(), schema.source());
            println!("{:<8} {:<20} {}", "short", "full", "display");
            for (short, full) in schema.get_entity_mapping() {
                let display = schema.get_entity_display_names().get(short).map(String::as_str).unwrap_or("");
                println!("{:<8} {:<20} {}", short, full, display);
            }
        }
        Command::Generate { dir, fixture, subjects, sessions, runs, rows } => {
            if fixture {
                write_fixture(&dir).with_context(|| format!("writing fixture to {}", dir.display()))?;
                info!(target: "bids_duckdb", "wrote fixture dataset to {}", dir.display());
            } else {
                let spec = SyntheticSpec { subjects, sessions, runs, rows_per_file: rows, ..SyntheticSpec::default() };
                let n = write_synthetic(&dir, &spec).with_context(|| format!("writing dataset to {}", dir.display()))?;
                println!("wrote {} events files to {}", n, dir.display());
            }
        }
        Command::Load { root, strategy, pattern, metadata, short_names, participants, materialize, db, query } => {
            let strategy: Strategy = strategy.parse()?;
            if (participants && strategy != Strategy::Preprocess) || (materialize && strategy != Strategy::TableFunction) {
                bail!("--participants needs the preprocess strategy and --materialize the table_function strategy");
            }
            let schema = load_schema(&cli.schema);
            let session = Rc::new(match &db {
                Some(path) => Session::open(path)?,
                None => Session::open_in_memory()?,
            });
            let options = if short_names { LoaderOptions::default().with_short_names() } else { LoaderOptions::default() };
            let loader: Box<dyn BidsLoader> = match strategy {
                Strategy::Sql => Box::new(SqlRegexLoader::new(&root, schema, Some(session), options)?),
                Strategy::Preprocess => {
                    let l = PreprocessLoader::new(&root, schema, Some(session), options)?;
                    if participants {
                        match l.load_participants()? {
                            Some(t) => println!("participants -> {}", t),
                            None => println!("participants.tsv not found"),
                        }
                    }
                    Box::new(l)
                }
                Strategy::TableFunction => {
                    let l = TableFunctionLoader::new(&root, schema, Some(session), options)?;
                    let view = l.load_tabular(&pattern)?;
                    if materialize {
                        println!("materialized -> {}", l.materialize_view(&view)?);
                    }
                    Box::new(l)
                }
            };
            if strategy != Strategy::TableFunction {
                loader.load_tabular(&pattern)?;
            }
            if let Some(meta) = &metadata {
                loader.load_metadata(meta)?;
            }
            for (table, n) in loader.get_statistics()?.tables {
                println!("{:<32} {:>10}", table, n);
            }
            if let Some(sql) = &query {
                let df = loader.query_df(sql)?;
                println!("{}", df);
            }
        }
        Command::Bench { root, strategies, pattern, config, json } => {
            let mut cfg = match &config {
                Some(p) => BenchConfig::from_path(p)?,
                None => BenchConfig::default(),
            };
            if !strategies.is_empty() { cfg.strategies = strategies; }
            if let Some(p) = pattern { cfg.pattern = p; }
            let schema = load_schema(&cli.schema);
            let mut suite = BenchmarkSuite::new(&root, schema);
            let results = suite.run_config(&cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(results)?);
            } else {
                println!("{}", summary(results));
            }
        }
    }
    Ok(())
}
