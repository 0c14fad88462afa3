//! Runtime configuration for loaders, the schema fetch and benchmark runs.
//!
//! Options are plain serde structs with defaults; `SchemaConfig` additionally
//! honours environment overrides so the binary and tests can steer the fetch
//! without code changes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BidsError, BidsResult};

pub const DEFAULT_SCHEMA_VERSION: &str = "master";
pub const DEFAULT_SCHEMA_BASE_URL: &str = "https://raw.githubusercontent.com/bids-standard/bids-specification";

pub const DEFAULT_TABULAR_PATTERN: &str = "**/*.tsv";
pub const DEFAULT_METADATA_PATTERN: &str = "**/*.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Name entity columns `subject`/`session` rather than `sub`/`ses`.
    pub use_full_names: bool,
    pub tabular_table: String,
    pub metadata_table: String,
    pub participants_table: String,
    /// Cell text read as null by every strategy.
    pub null_marker: String,
    /// Rows per file used to infer column types for the host-lazy scan; a file whose
    /// later values do not fit the inferred types is typed as text.
    pub sample_rows: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            use_full_names: true,
            tabular_table: "bids_tsv_data".to_string(),
            metadata_table: "bids_json_metadata".to_string(),
            participants_table: "bids_participants".to_string(),
            null_marker: "n/a".to_string(),
            sample_rows: 100,
        }
    }
}

impl LoaderOptions {
    pub fn with_short_names(mut self) -> Self {
        self.use_full_names = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Git branch or tag of the BIDS specification.
    pub version: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Skip the network entirely and use the built-in entity table.
    pub offline: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_SCHEMA_VERSION.to_string(),
            base_url: DEFAULT_SCHEMA_BASE_URL.to_string(),
            timeout_secs: 10,
            offline: false,
        }
    }
}

impl SchemaConfig {
    pub fn with_version(version: impl Into<String>) -> Self {
        Self { version: version.into(), ..Self::default() }
    }

    /// Defaults overridden by `BIDS_SCHEMA_VERSION`, `BIDS_SCHEMA_URL`,
    /// `BIDS_SCHEMA_TIMEOUT_SECS` and `BIDS_SCHEMA_OFFLINE`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("BIDS_SCHEMA_VERSION") { if !v.trim().is_empty() { cfg.version = v.trim().to_string(); } }
        if let Ok(v) = std::env::var("BIDS_SCHEMA_URL") { if !v.trim().is_empty() { cfg.base_url = v.trim().trim_end_matches('/').to_string(); } }
        if let Ok(v) = std::env::var("BIDS_SCHEMA_TIMEOUT_SECS") { if let Ok(n) = v.trim().parse::<u64>() { cfg.timeout_secs = n; } }
        if let Ok(v) = std::env::var("BIDS_SCHEMA_OFFLINE") { cfg.offline = parse_flag(&v); }
        cfg
    }

    /// Directory URL holding the schema object files for this version.
    pub fn objects_url(&self) -> String {
        format!("{}/{}/src/schema/objects", self.base_url.trim_end_matches('/'), self.version)
    }

    pub fn entities_url(&self) -> String { format!("{}/entities.yaml", self.objects_url()) }
}

fn parse_flag(v: &str) -> bool {
    let l = v.trim().to_ascii_lowercase();
    l == "1" || l == "true" || l == "yes" || l == "on"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub strategies: Vec<String>,
    /// Glob handed to every strategy's tabular load.
    pub pattern: String,
    /// Query name -> SQL; an empty map selects the default query set.
    pub queries: BTreeMap<String, String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            strategies: vec!["sql".to_string(), "preprocess".to_string(), "table_function".to_string()],
            pattern: DEFAULT_TABULAR_PATTERN.to_string(),
            queries: BTreeMap::new(),
        }
    }
}

impl BenchConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: &Path) -> BidsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
            Some("json") => Ok(serde_json::from_str(&text)?),
            _ => Err(BidsError::Config(format!("unsupported bench config format: {}", path.display()))),
        }
    }
}
