//!
//! BIDS entity schema
//! ------------------
//! Entity definitions (full name -> short name, display name, value type) are
//! read from the versioned `entities.yaml` of the BIDS specification. Any
//! failure along the way (network, HTTP status, YAML, missing fields) falls
//! back to a fixed table of common entities with a warning, so building a
//! schema never fails.
//!
//! The short-name projections are computed lazily once per instance. There is
//! no process-wide default: the program loads one schema and hands the same
//! `Arc<EntitySchema>` to every loader.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SchemaConfig;
use crate::error::{BidsError, BidsResult};

mod fallback;

/// One entry of `entities.yaml`, keyed by the entity's full name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Short name used in filenames, e.g. `sub`.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Remote,
    Fallback,
}

#[derive(Debug)]
pub struct EntitySchema {
    version: String,
    objects_url: String,
    source: SchemaSource,
    entities: BTreeMap<String, EntityDefinition>,
    short_to_full: OnceCell<BTreeMap<String, String>>,
    display_names: OnceCell<BTreeMap<String, String>>,
    short_names: OnceCell<BTreeSet<String>>,
}

impl EntitySchema {
    /// Fetch the entity definitions for `cfg.version`, falling back to the
    /// built-in table on any failure.
    pub fn load(cfg: &SchemaConfig) -> Self {
        if cfg.offline {
            info!(target: "bids_duckdb::schema", "offline mode: using built-in entity definitions");
            return Self::fallback_for(cfg);
        }
        let url = cfg.entities_url();
        info!(target: "bids_duckdb::schema", "Loading BIDS entities from {}", url);
        match fetch_entities(&url, cfg.timeout_secs) {
            Ok(entities) => {
                info!(target: "bids_duckdb::schema", "Loaded {} entities from BIDS schema", entities.len());
                Self::from_parts(&cfg.version, cfg.objects_url(), SchemaSource::Remote, entities)
            }
            Err(e) => {
                warn!(target: "bids_duckdb::schema", "Failed to load BIDS schema from {}: {}; using fallback entity definitions", url, e);
                Self::fallback_for(cfg)
            }
        }
    }

    /// Built-in entity table for the default configuration.
    pub fn fallback() -> Self { Self::fallback_for(&SchemaConfig::default()) }

    fn fallback_for(cfg: &SchemaConfig) -> Self {
        Self::from_parts(&cfg.version, cfg.objects_url(), SchemaSource::Fallback, fallback::fallback_entities())
    }

    /// Parse an `entities.yaml` document directly.
    pub fn from_yaml_str(version: &str, text: &str) -> BidsResult<Self> {
        let entities = parse_entities_yaml(text)?;
        let cfg = SchemaConfig::with_version(version);
        Ok(Self::from_parts(version, cfg.objects_url(), SchemaSource::Remote, entities))
    }

    fn from_parts(version: &str, objects_url: String, source: SchemaSource, entities: BTreeMap<String, EntityDefinition>) -> Self {
        Self {
            version: version.to_string(),
            objects_url,
            source,
            entities,
            short_to_full: OnceCell::new(),
            display_names: OnceCell::new(),
            short_names: OnceCell::new(),
        }
    }

    pub fn version(&self) -> &str { &self.version }

    pub fn base_url(&self) -> &str { &self.objects_url }

    pub fn source(&self) -> SchemaSource { self.source }

    /// Full name -> definition.
    pub fn load_entities(&self) -> &BTreeMap<String, EntityDefinition> { &self.entities }

    /// Short name -> full name, e.g. `sub` -> `subject`.
    pub fn get_entity_mapping(&self) -> &BTreeMap<String, String> {
        self.short_to_full.get_or_init(|| {
            let mut m = BTreeMap::new();
            for (full, def) in self.entities.iter() {
                if !def.name.is_empty() { m.insert(def.name.clone(), full.clone()); }
            }
            info!(target: "bids_duckdb::schema", "Created mapping for {} entities", m.len());
            m
        })
    }

    /// Short name -> display name; defaults to the title-cased short name.
    pub fn get_entity_display_names(&self) -> &BTreeMap<String, String> {
        self.display_names.get_or_init(|| {
            self.entities
                .values()
                .filter(|d| !d.name.is_empty())
                .map(|d| {
                    let display = d.display_name.clone().unwrap_or_else(|| title_case(&d.name));
                    (d.name.clone(), display)
                })
                .collect()
        })
    }

    pub fn get_all_entity_short_names(&self) -> &BTreeSet<String> {
        self.short_names.get_or_init(|| self.get_entity_mapping().keys().cloned().collect())
    }

    /// Full name for a short name; unknown names map to themselves.
    pub fn get_entity_full_name<'a>(&'a self, short_name: &'a str) -> &'a str {
        self.get_entity_mapping().get(short_name).map(String::as_str).unwrap_or(short_name)
    }
}

fn fetch_entities(url: &str, timeout_secs: u64) -> BidsResult<BTreeMap<String, EntityDefinition>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| BidsError::Schema(format!("http client: {}", e)))?;
    let resp = client.get(url).send().map_err(|e| BidsError::Schema(format!("request failed: {}", e)))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(BidsError::Schema(format!("HTTP {} for {}", status, url)));
    }
    let text = resp.text().map_err(|e| BidsError::Schema(format!("reading body: {}", e)))?;
    parse_entities_yaml(&text)
}

fn parse_entities_yaml(text: &str) -> BidsResult<BTreeMap<String, EntityDefinition>> {
    let entities: BTreeMap<String, EntityDefinition> = serde_yaml::from_str(text)?;
    if entities.is_empty() {
        return Err(BidsError::Schema("entity document is empty".into()));
    }
    if let Some((full, _)) = entities.iter().find(|(_, d)| d.name.trim().is_empty()) {
        return Err(BidsError::Schema(format!("entity '{}' has no short name", full)));
    }
    Ok(entities)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start { out.extend(ch.to_uppercase()); } else { out.extend(ch.to_lowercase()); }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod schema_tests;
