use super::*;
use crate::dataset::write_fixture;
use crate::engine::value_to_i64;

fn fixture() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    write_fixture(tmp.path()).unwrap();
    tmp
}

fn schema() -> Arc<EntitySchema> { Arc::new(EntitySchema::fallback()) }

fn loader(strategy: Strategy, root: &Path) -> Box<dyn BidsLoader> {
    create_loader(strategy, root, schema(), None, LoaderOptions::default()).unwrap()
}

fn count(l: &dyn BidsLoader, sql: &str) -> i64 {
    let r = l.query(sql).unwrap();
    r.rows.first().and_then(|row| row.first()).and_then(value_to_i64).unwrap()
}

#[test]
fn invalid_root_fails_fast() {
    for strategy in Strategy::ALL {
        let err = create_loader(strategy, Path::new("/nonexistent/path"), schema(), None, LoaderOptions::default()).err().unwrap();
        assert!(matches!(err, BidsError::RootNotFound(_)));
    }
}

#[test]
fn strategy_names_round_trip() {
    for strategy in Strategy::ALL {
        assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
    }
    assert_eq!("python".parse::<Strategy>().unwrap(), Strategy::Preprocess);
    assert!(matches!("pandas".parse::<Strategy>(), Err(BidsError::UnknownStrategy(_))));
}

#[test]
fn core_entity_helpers() {
    let tmp = fixture();
    let core = LoaderCore::new(tmp.path(), schema(), None, LoaderOptions::default()).unwrap();
    let got = core.parse_entities(Path::new("sub-01_ses-pre_task-rest_bold.nii.gz"));
    assert_eq!(got.get("sub").map(String::as_str), Some("01"));
    assert_eq!(got.get("ses").map(String::as_str), Some("pre"));
    assert_eq!(got.get("task").map(String::as_str), Some("rest"));
    assert_eq!(core.get_entity_full_name("sub"), "subject");
    assert_eq!(core.get_entity_full_name("unknown"), "unknown");
    for short in core.schema().get_all_entity_short_names() {
        assert_eq!(core.get_entity_column_name(short, true), core.schema().get_entity_full_name(short));
        assert_eq!(core.get_entity_column_name(short, false), short.as_str());
    }
}

#[test]
fn sql_loads_fixture() {
    let tmp = fixture();
    let l = loader(Strategy::Sql, tmp.path());
    assert_eq!(l.load_tabular("**/*.tsv").unwrap(), "bids_tsv_data");
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data"), 5);
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data WHERE subject = '01' AND task = 'rest'"), 2);
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data WHERE session = 'pre' AND run = '01'"), 1);
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data WHERE filename = 'participants.tsv' AND subject IS NULL"), 2);
}

#[test]
fn sql_without_matches_is_no_matching_files() {
    let tmp = fixture();
    let l = loader(Strategy::Sql, tmp.path());
    let err = l.load_tabular("**/*_bold.nii.gz").unwrap_err();
    assert!(matches!(err, BidsError::NoMatchingFiles { .. }));
}

#[test]
fn sql_loads_metadata_text() {
    let tmp = fixture();
    let l = loader(Strategy::Sql, tmp.path());
    l.load_metadata("**/*.json").unwrap();
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_json_metadata"), 2);
    let r = l.query("SELECT json_content FROM bids_json_metadata WHERE subject = '01'").unwrap();
    assert!(r.text(0, "json_content").unwrap().contains("RepetitionTime"));
}

#[test]
fn preprocess_loads_fixture_and_participants() {
    let tmp = fixture();
    let l = PreprocessLoader::new(tmp.path(), schema(), None, LoaderOptions::default()).unwrap();
    l.load_tabular("**/*.tsv").unwrap();
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_tsv_data"), 5);
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_tsv_data WHERE subject = '02' AND session = 'pre'"), 1);
    assert_eq!(l.load_participants().unwrap().as_deref(), Some("bids_participants"));
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_participants"), 2);
}

#[test]
fn preprocess_zero_files_yields_empty_table() {
    let tmp = fixture();
    let l = loader(Strategy::Preprocess, tmp.path());
    assert_eq!(l.load_tabular("**/*_bold.nii.gz").unwrap(), "bids_tsv_data");
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data"), 0);
    assert!(l.get_table_names().unwrap().contains(&"bids_tsv_data".to_string()));
}

#[test]
fn preprocess_missing_participants_is_none() {
    let tmp = tempfile::tempdir().unwrap();
    let l = PreprocessLoader::new(tmp.path(), schema(), None, LoaderOptions::default()).unwrap();
    assert_eq!(l.load_participants().unwrap(), None);
}

#[test]
fn preprocess_metadata_isolates_bad_json() {
    let tmp = fixture();
    std::fs::write(tmp.path().join("sub-01/func/sub-01_task-rest_physio.json"), "{oops").unwrap();
    let l = loader(Strategy::Preprocess, tmp.path());
    l.load_metadata("**/*.json").unwrap();
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_json_metadata"), 3);
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_json_metadata WHERE json_content = '{}'"), 1);
}

const INVALID_UTF8_TSV: &[u8] = b"onset\ttrial_type\n1.0\t\xff\xfe\n";

#[test]
fn preprocess_aborts_on_malformed_tabular_file() {
    let tmp = fixture();
    std::fs::create_dir_all(tmp.path().join("sub-03/func")).unwrap();
    std::fs::write(tmp.path().join("sub-03/func/sub-03_task-rest_events.tsv"), INVALID_UTF8_TSV).unwrap();
    let l = loader(Strategy::Preprocess, tmp.path());
    assert!(l.load_tabular("**/*_events.tsv").is_err());
    assert!(!l.get_table_names().unwrap().contains(&"bids_tsv_data".to_string()));
}

#[test]
fn table_function_skips_malformed_tabular_file() {
    let tmp = fixture();
    std::fs::create_dir_all(tmp.path().join("sub-03/func")).unwrap();
    std::fs::write(tmp.path().join("sub-03/func/sub-03_task-rest_events.tsv"), INVALID_UTF8_TSV).unwrap();
    let l = loader(Strategy::TableFunction, tmp.path());
    l.load_tabular("**/*_events.tsv").unwrap();
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data"), 3);
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data WHERE subject = '03'"), 0);
    assert_eq!(count(l.as_ref(), "SELECT COUNT(trial_type) FROM bids_tsv_data"), 3);
}

#[test]
fn reloading_a_view_releases_the_previous_source() {
    let tmp = fixture();
    let l = TableFunctionLoader::new(tmp.path(), schema(), None, LoaderOptions::default()).unwrap();
    for _ in 0..3 {
        l.load_tabular("**/*.tsv").unwrap();
        l.load_metadata("**/*.json").unwrap();
    }
    assert_eq!(l.core().session().sources().len(), 2);
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_tsv_data"), 5);
}

#[test]
fn table_function_view_and_materialize() {
    let tmp = fixture();
    let l = TableFunctionLoader::new(tmp.path(), schema(), None, LoaderOptions::default()).unwrap();
    assert_eq!(l.load_tabular("**/*.tsv").unwrap(), "bids_tsv_data");
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_tsv_data"), 5);
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_tsv_data WHERE subject = '01'"), 2);
    for _ in 0..2 {
        assert_eq!(l.materialize_view("bids_tsv_data").unwrap(), "bids_tsv_data_materialized");
        assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_tsv_data_materialized"), 5);
    }
}

#[test]
fn table_function_registration_is_idempotent() {
    let tmp = fixture();
    let l = TableFunctionLoader::new(tmp.path(), schema(), None, LoaderOptions::default()).unwrap();
    l.register_functions().unwrap();
    l.register_functions().unwrap();
    l.load_metadata("**/*.json").unwrap();
    l.load_metadata("**/*.json").unwrap();
    assert_eq!(count(&l, "SELECT COUNT(*) FROM bids_json_metadata"), 2);
}

#[test]
fn short_names_mode() {
    let tmp = fixture();
    let l = create_loader(Strategy::Preprocess, tmp.path(), schema(), None, LoaderOptions::default().with_short_names()).unwrap();
    l.load_tabular("**/*.tsv").unwrap();
    assert_eq!(count(l.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data WHERE sub = '01'"), 2);
}

#[test]
fn statistics_and_frames() {
    let tmp = fixture();
    let l = loader(Strategy::Preprocess, tmp.path());
    l.load_tabular("**/*.tsv").unwrap();
    l.load_metadata("**/*.json").unwrap();
    let stats = l.get_statistics().unwrap();
    assert_eq!(stats.tables.get("bids_tsv_data"), Some(&5));
    assert_eq!(stats.tables.get("bids_json_metadata"), Some(&2));
    let df = l.query_df("SELECT subject, COUNT(*) AS n FROM bids_tsv_data WHERE subject IS NOT NULL GROUP BY subject ORDER BY subject").unwrap();
    assert_eq!(df.height(), 2);
}

#[test]
fn shared_session_replaces_same_named_tables() {
    let tmp = fixture();
    let session = Rc::new(Session::open_in_memory().unwrap());
    let a = create_loader(Strategy::Preprocess, tmp.path(), schema(), Some(session.clone()), LoaderOptions::default()).unwrap();
    let b = create_loader(Strategy::Sql, tmp.path(), schema(), Some(session.clone()), LoaderOptions::default()).unwrap();
    a.load_tabular("**/*.tsv").unwrap();
    b.load_tabular("**/*_events.tsv").unwrap();
    assert_eq!(count(a.as_ref(), "SELECT COUNT(*) FROM bids_tsv_data"), 3);
}
