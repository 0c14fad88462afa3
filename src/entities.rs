//! Filename entity extraction and entity column naming.
//!
//! A BIDS filename encodes entities as `key-value` tokens, e.g.
//! `sub-02_ses-pre_task-rest_run-01_events.tsv`. Extraction scans the name
//! left to right for non-overlapping `[a-zA-Z0-9]+-[a-zA-Z0-9]+` tokens and
//! keeps the ones whose key is a known short name. A repeated key keeps its
//! last occurrence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::EntitySchema;

static ENTITY_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9]+)-([a-zA-Z0-9]+)").expect("entity token regex"));

/// Short name -> value for the recognised entities of `filename`.
pub fn extract_entities(filename: &str, known_short_names: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for caps in ENTITY_TOKEN.captures_iter(filename) {
        let (key, value) = (&caps[1], &caps[2]);
        if known_short_names.contains(key) {
            out.insert(key.to_string(), value.to_string());
        }
    }
    out
}

/// Final path component as text; empty for paths without one.
pub fn file_name_of(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Entity-aware column naming derived from one schema.
#[derive(Debug, Clone)]
pub struct EntityNaming {
    short_to_full: BTreeMap<String, String>,
    short_names: BTreeSet<String>,
    use_full_names: bool,
}

impl EntityNaming {
    pub fn new(schema: &EntitySchema, use_full_names: bool) -> Self {
        Self {
            short_to_full: schema.get_entity_mapping().clone(),
            short_names: schema.get_all_entity_short_names().clone(),
            use_full_names,
        }
    }

    pub fn short_names(&self) -> &BTreeSet<String> { &self.short_names }

    pub fn uses_full_names(&self) -> bool { self.use_full_names }

    pub fn full_name<'a>(&'a self, short_name: &'a str) -> &'a str {
        self.short_to_full.get(short_name).map(String::as_str).unwrap_or(short_name)
    }

    pub fn column_name_as<'a>(&'a self, short_name: &'a str, use_full_names: bool) -> &'a str {
        if use_full_names { self.full_name(short_name) } else { short_name }
    }

    /// Column name under this naming's configured mode.
    pub fn column_name<'a>(&'a self, short_name: &'a str) -> &'a str {
        self.column_name_as(short_name, self.use_full_names)
    }

    /// (short name, column name) for every schema entity, ordered by short name.
    pub fn entity_columns(&self) -> Vec<(String, String)> {
        self.short_names.iter().map(|s| (s.clone(), self.column_name(s).to_string())).collect()
    }

    /// Entities of the file at `path`, keyed by column name.
    pub fn entities_for(&self, path: &Path) -> BTreeMap<String, String> {
        extract_entities(&file_name_of(path), &self.short_names)
            .into_iter()
            .map(|(k, v)| (self.column_name(&k).to_string(), v))
            .collect()
    }
}
