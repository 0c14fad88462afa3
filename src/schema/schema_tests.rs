use super::*;

const ENTITIES_YAML: &str = r#"
subject:
  name: sub
  display_name: Subject
  description: |
    A person or animal participating in the study.
  type: string
  format: label
session:
  name: ses
  display_name: Session
  type: string
  format: label
run:
  name: run
  type: string
  format: index
"#;

fn unreachable_config(version: &str) -> SchemaConfig {
    SchemaConfig {
        version: version.to_string(),
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        offline: false,
    }
}

#[test]
fn fallback_has_core_entities() {
    let schema = EntitySchema::fallback();
    assert_eq!(schema.source(), SchemaSource::Fallback);
    let entities = schema.load_entities();
    assert_eq!(entities.len(), 11);
    let mapping = schema.get_entity_mapping();
    assert_eq!(mapping.get("sub").map(String::as_str), Some("subject"));
    assert_eq!(mapping.get("ses").map(String::as_str), Some("session"));
    assert_eq!(mapping.get("task").map(String::as_str), Some("task"));
    assert_eq!(mapping.get("ce").map(String::as_str), Some("ceagent"));
    assert_eq!(mapping.get("desc").map(String::as_str), Some("description"));
}

#[test]
fn nonexistent_version_falls_back() {
    let schema = EntitySchema::load(&unreachable_config("nonexistent-version-xyz"));
    assert_eq!(schema.source(), SchemaSource::Fallback);
    assert_eq!(schema.version(), "nonexistent-version-xyz");
    assert!(schema.load_entities().contains_key("subject"));
    assert_eq!(schema.get_entity_full_name("sub"), "subject");
    assert_eq!(schema.get_entity_full_name("ses"), "session");
}

#[test]
fn offline_mode_never_fetches() {
    let cfg = SchemaConfig { offline: true, ..unreachable_config("master") };
    let schema = EntitySchema::load(&cfg);
    assert_eq!(schema.source(), SchemaSource::Fallback);
}

#[test]
fn parses_remote_document() {
    let schema = EntitySchema::from_yaml_str("v1.8.0", ENTITIES_YAML).unwrap();
    assert_eq!(schema.source(), SchemaSource::Remote);
    assert!(schema.base_url().contains("v1.8.0"));
    let short: Vec<&str> = schema.get_all_entity_short_names().iter().map(String::as_str).collect();
    assert_eq!(short, vec!["run", "ses", "sub"]);
    assert_eq!(schema.load_entities()["subject"].format.as_deref(), Some("label"));
}

#[test]
fn display_names_default_to_title_case() {
    let schema = EntitySchema::from_yaml_str("master", ENTITIES_YAML).unwrap();
    let names = schema.get_entity_display_names();
    assert_eq!(names.get("sub").map(String::as_str), Some("Subject"));
    assert_eq!(names.get("run").map(String::as_str), Some("Run"));
}

#[test]
fn missing_short_name_is_rejected() {
    let err = EntitySchema::from_yaml_str("master", "subject:\n  display_name: Subject\n").unwrap_err();
    assert!(matches!(err, BidsError::Yaml(_)));
    let err = EntitySchema::from_yaml_str("master", "subject:\n  name: ''\n").unwrap_err();
    assert!(matches!(err, BidsError::Schema(_)));
}

#[test]
fn unknown_short_name_maps_to_itself() {
    let schema = EntitySchema::fallback();
    assert_eq!(schema.get_entity_full_name("unknown"), "unknown");
}

#[test]
fn projections_are_stable_across_calls() {
    let schema = EntitySchema::fallback();
    let a = schema.get_entity_mapping() as *const _;
    let b = schema.get_entity_mapping() as *const _;
    assert_eq!(a, b);
    assert_eq!(schema.get_all_entity_short_names().len(), schema.get_entity_mapping().len());
}

#[test]
fn title_case_words() {
    assert_eq!(title_case("sub"), "Sub");
    assert_eq!(title_case("phase encoding"), "Phase Encoding");
}
