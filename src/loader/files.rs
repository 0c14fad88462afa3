//! Dataset file discovery and sidecar reading.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BidsError, BidsResult};

const MATCH_OPTIONS: MatchOptions =
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: false };

pub fn compile_pattern(pattern: &str) -> BidsResult<Pattern> {
    Pattern::new(pattern).map_err(|e| BidsError::Config(format!("invalid glob '{}': {}", pattern, e)))
}

/// Regular files under `root` whose root-relative path matches `pattern`, in walk order
/// (sorted by file name at every level).
pub fn match_files(root: &Path, pattern: &str) -> BidsResult<Vec<PathBuf>> {
    let pat = compile_pattern(pattern)?;
    let mut out = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| BidsError::Io(e.into()))?;
        if !entry.file_type().is_file() { continue; }
        let Ok(rel) = entry.path().strip_prefix(root) else { continue };
        if pat.matches_with(&relative_key(rel), MATCH_OPTIONS) {
            out.push(entry.into_path());
        }
    }
    debug!(target: "bids_duckdb::loader", "matched {} files for '{}' under {}", out.len(), pattern, root.display());
    Ok(out)
}

/// Glob understood by the engine's own file readers: `root/pattern`.
pub fn engine_glob(root: &Path, pattern: &str) -> String { root.join(pattern).to_string_lossy().into_owned() }

fn relative_key(rel: &Path) -> String {
    rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// Read a JSON sidecar and return it re-serialized in compact form.
pub fn read_json_document(path: &Path) -> BidsResult<String> {
    let text = std::fs::read_to_string(path)?;
    let doc: serde_json::Value = serde_json::from_str(&text)?;
    Ok(doc.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, "x").unwrap();
    }

    #[test]
    fn recursive_pattern_spans_zero_or_more_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "participants.tsv");
        touch(tmp.path(), "sub-01/func/sub-01_task-rest_events.tsv");
        touch(tmp.path(), "sub-01/func/sub-01_task-rest_bold.json");
        let got = match_files(tmp.path(), "**/*.tsv").unwrap();
        assert_eq!(got.len(), 2);
        assert!(got[0].ends_with("participants.tsv"));
        assert!(got[1].ends_with("sub-01_task-rest_events.tsv"));
    }

    #[test]
    fn star_does_not_cross_directories() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "participants.tsv");
        touch(tmp.path(), "sub-01/func/sub-01_task-rest_events.tsv");
        let got = match_files(tmp.path(), "*.tsv").unwrap();
        assert_eq!(got.len(), 1);
        assert!(match_files(tmp.path(), "**/*_bold.nii.gz").unwrap().is_empty());
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(match_files(tmp.path(), "[a"), Err(BidsError::Config(_))));
    }

    #[test]
    fn json_is_reserialized() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("a.json");
        std::fs::write(&p, "{\n  \"RepetitionTime\": 2.0\n}\n").unwrap();
        assert_eq!(read_json_document(&p).unwrap(), "{\"RepetitionTime\":2.0}");
        std::fs::write(&p, "not json").unwrap();
        assert!(matches!(read_json_document(&p), Err(BidsError::Json(_))));
    }
}
