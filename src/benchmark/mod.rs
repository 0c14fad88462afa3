//! Side-by-side benchmark of the loading strategies.
//!
//! Strategies run strictly one after another, each in its own fresh engine
//! session. Load and query failures are recorded in the strategy's result and
//! never abort the run; only an unknown strategy name is rejected up front.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BenchConfig, LoaderOptions, DEFAULT_TABULAR_PATTERN};
use crate::engine::Session;
use crate::error::BidsResult;
use crate::loader::{create_loader, Strategy};
use crate::schema::EntitySchema;

pub mod report;

pub use report::{fastest_loader, fastest_querier, load_ranking, query_ranking, summary, Ranked};

/// Measurements for one strategy in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    /// Seconds; zero when the load failed.
    pub load_time: f64,
    pub query_times: BTreeMap<String, f64>,
    pub row_counts: BTreeMap<String, u64>,
    /// Engine-estimated bytes held by tables, best effort.
    pub memory_usage: u64,
    pub errors: Vec<String>,
}

impl BenchmarkResult {
    pub fn new(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            started_at: Utc::now(),
            load_time: 0.0,
            query_times: BTreeMap::new(),
            row_counts: BTreeMap::new(),
            memory_usage: 0,
            errors: Vec::new(),
        }
    }

    pub fn loaded(&self) -> bool { self.load_time > 0.0 }

    /// Mean over the queries that produced a positive timing.
    pub fn mean_query_time(&self) -> Option<f64> {
        let valid: Vec<f64> = self.query_times.values().copied().filter(|t| *t > 0.0).collect();
        if valid.is_empty() { None } else { Some(valid.iter().sum::<f64>() / valid.len() as f64) }
    }
}

pub fn default_queries() -> Vec<(String, String)> {
    [
        ("count_all", "SELECT COUNT(*) FROM bids_tsv_data"),
        ("distinct_subjects", "SELECT COUNT(DISTINCT subject) FROM bids_tsv_data WHERE subject IS NOT NULL"),
        ("group_by_subject", "SELECT subject, COUNT(*) AS n FROM bids_tsv_data WHERE subject IS NOT NULL GROUP BY subject"),
        ("filter_by_task", "SELECT * FROM bids_tsv_data WHERE task IS NOT NULL LIMIT 100"),
    ]
    .iter()
    .map(|(n, q)| (n.to_string(), q.to_string()))
    .collect()
}

pub struct BenchmarkSuite {
    root: PathBuf,
    schema: Arc<EntitySchema>,
    options: LoaderOptions,
    pattern: String,
    results: Vec<BenchmarkResult>,
}

impl BenchmarkSuite {
    pub fn new(root: &Path, schema: Arc<EntitySchema>) -> Self {
        Self {
            root: root.to_path_buf(),
            schema,
            options: LoaderOptions::default(),
            pattern: DEFAULT_TABULAR_PATTERN.to_string(),
            results: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = pattern.to_string();
        self
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn results(&self) -> &[BenchmarkResult] { &self.results }

    /// Run every named strategy in order. `queries` empty selects `default_queries()`.
    pub fn run_all(&mut self, strategies: &[String], queries: &[(String, String)]) -> BidsResult<&[BenchmarkResult]> {
        let parsed: Vec<Strategy> = strategies.iter().map(|s| s.parse()).collect::<BidsResult<_>>()?;
        let defaults;
        let queries = if queries.is_empty() {
            defaults = default_queries();
            &defaults[..]
        } else {
            queries
        };
        self.results.clear();
        for strategy in parsed {
            info!(target: "bids_duckdb::bench", "benchmarking {} on {}", strategy, self.root.display());
            let result = self.run_strategy(strategy, queries);
            self.results.push(result);
        }
        Ok(&self.results)
    }

    pub fn run_config(&mut self, cfg: &BenchConfig) -> BidsResult<&[BenchmarkResult]> {
        self.pattern = cfg.pattern.clone();
        let queries: Vec<(String, String)> = cfg.queries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.run_all(&cfg.strategies, &queries)
    }

    fn run_strategy(&self, strategy: Strategy, queries: &[(String, String)]) -> BenchmarkResult {
        let mut result = BenchmarkResult::new(strategy.as_str());
        let session = match Session::open_in_memory() {
            Ok(s) => Rc::new(s),
            Err(e) => {
                result.errors.push(format!("Load error: {}", e));
                return result;
            }
        };
        let loader = match create_loader(strategy, &self.root, self.schema.clone(), Some(session.clone()), self.options.clone()) {
            Ok(l) => l,
            Err(e) => {
                warn!(target: "bids_duckdb::bench", "{}: loader construction failed: {}", strategy, e);
                result.errors.push(format!("Load error: {}", e));
                return result;
            }
        };

        let start = Instant::now();
        if let Err(e) = loader.load_tabular(&self.pattern) {
            warn!(target: "bids_duckdb::bench", "{}: load failed: {}", strategy, e);
            result.errors.push(format!("Load error: {}", e));
            return result;
        }
        // a positive timing marks a successful load
        result.load_time = start.elapsed().as_secs_f64().max(f64::MIN_POSITIVE);
        info!(target: "bids_duckdb::bench", "{}: load completed in {:.3}s", strategy, result.load_time);

        match loader.get_statistics() {
            Ok(stats) => result.row_counts = stats.tables,
            Err(e) => warn!(target: "bids_duckdb::bench", "{}: statistics failed: {}", strategy, e),
        }

        for (name, sql) in queries {
            let start = Instant::now();
            match loader.query(sql) {
                Ok(rows) => {
                    let t = start.elapsed().as_secs_f64().max(f64::MIN_POSITIVE);
                    debug!(target: "bids_duckdb::bench", "{}: query {} returned {} rows in {:.3}s", strategy, name, rows.len(), t);
                    result.query_times.insert(name.clone(), t);
                }
                Err(e) => {
                    warn!(target: "bids_duckdb::bench", "{}: query {} failed: {}", strategy, name, e);
                    result.errors.push(format!("Query '{}' error: {}", name, e));
                }
            }
        }

        match session.estimated_size() {
            Ok(bytes) => result.memory_usage = bytes,
            Err(e) => debug!(target: "bids_duckdb::bench", "{}: no size estimate: {}", strategy, e),
        }
        result
    }

    pub fn summary(&self) -> String { summary(&self.results) }
}

/// Run `strategies` (all three when empty) against `root` and log the summary.
pub fn run_benchmark(root: &Path, schema: Arc<EntitySchema>, strategies: &[String], queries: &[(String, String)]) -> BidsResult<Vec<BenchmarkResult>> {
    let strategies: Vec<String> =
        if strategies.is_empty() { Strategy::ALL.iter().map(|s| s.as_str().to_string()).collect() } else { strategies.to_vec() };
    let mut suite = BenchmarkSuite::new(root, schema);
    suite.run_all(&strategies, queries)?;
    info!(target: "bids_duckdb::bench", "{}", suite.summary());
    Ok(suite.results)
}
