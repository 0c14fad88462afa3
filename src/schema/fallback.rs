//! Built-in entity table used whenever the remote schema cannot be loaded.

use std::collections::BTreeMap;

use super::EntityDefinition;

/// (full name, short name, display name, format)
const FALLBACK_ENTITIES: &[(&str, &str, &str, Option<&str>)] = &[
    ("subject", "sub", "Subject", None),
    ("session", "ses", "Session", None),
    ("task", "task", "Task", None),
    ("acquisition", "acq", "Acquisition", None),
    ("ceagent", "ce", "Contrast Enhancing Agent", None),
    ("reconstruction", "rec", "Reconstruction", None),
    ("direction", "dir", "Phase Encoding Direction", None),
    ("run", "run", "Run", Some("index")),
    ("echo", "echo", "Echo", Some("index")),
    ("space", "space", "Space", None),
    ("description", "desc", "Description", None),
];

pub(crate) fn fallback_entities() -> BTreeMap<String, EntityDefinition> {
    FALLBACK_ENTITIES
        .iter()
        .map(|(full, short, display, format)| {
            (
                full.to_string(),
                EntityDefinition {
                    name: short.to_string(),
                    display_name: Some(display.to_string()),
                    value_type: Some("string".to_string()),
                    format: format.map(|f| f.to_string()),
                    description: None,
                },
            )
        })
        .collect()
}
