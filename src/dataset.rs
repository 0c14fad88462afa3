//! Writers for small BIDS-like trees used by tests, benches and the `generate` command.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BidsResult;

fn write_file(root: &Path, rel: &str, body: &str) -> BidsResult<PathBuf> {
    let path = root.join(rel);
    if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
    fs::write(&path, body)?;
    Ok(path)
}

/// Two subjects, one with a session, sharing the `rest` task:
///
/// ```text
/// dataset_description.json
/// participants.tsv
/// sub-01/func/sub-01_task-rest_events.tsv                      (2 rows)
/// sub-01/func/sub-01_task-rest_bold.json
/// sub-02/ses-pre/func/sub-02_ses-pre_task-rest_run-01_events.tsv (1 row)
/// ```
pub fn write_fixture(root: &Path) -> BidsResult<()> {
    write_file(root, "dataset_description.json", "{\"Name\": \"Test Dataset\", \"BIDSVersion\": \"1.8.0\"}")?;
    write_file(root, "participants.tsv", "participant_id\tage\tsex\nsub-01\t25\tM\nsub-02\t30\tF\n")?;
    write_file(root, "sub-01/func/sub-01_task-rest_events.tsv", "onset\tduration\ttrial_type\n1.0\t2.0\tA\n3.0\t2.0\tB\n")?;
    write_file(root, "sub-01/func/sub-01_task-rest_bold.json", "{\"RepetitionTime\": 2.0, \"TaskName\": \"rest\"}")?;
    write_file(
        root,
        "sub-02/ses-pre/func/sub-02_ses-pre_task-rest_run-01_events.tsv",
        "onset\tduration\ttrial_type\n1.0\t2.0\tX\n",
    )?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub subjects: usize,
    /// Zero writes no `ses-` level.
    pub sessions: usize,
    pub runs: usize,
    pub tasks: Vec<String>,
    pub rows_per_file: usize,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self { subjects: 10, sessions: 2, runs: 2, tasks: vec!["rest".into(), "nback".into()], rows_per_file: 50 }
    }
}

impl SyntheticSpec {
    pub fn file_count(&self) -> usize {
        self.subjects * self.sessions.max(1) * self.runs.max(1) * self.tasks.len()
    }
}

fn mix(seed: u64) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in seed.to_le_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn events_body(seed: u64, rows: usize) -> String {
    let mut out = String::from("onset\tduration\ttrial_type\tresponse_time\n");
    for i in 0..rows {
        let h = mix(seed.wrapping_add(i as u64));
        let trial = if h % 2 == 0 { "go" } else { "stop" };
        // every seventh response is missing
        let rt = if h % 7 == 0 { "n/a".to_string() } else { format!("{:.3}", 0.2 + (h % 800) as f64 / 1000.0) };
        out.push_str(&format!("{:.1}\t{:.1}\t{}\t{}\n", i as f64 * 2.5, 1.0 + (h % 3) as f64 * 0.5, trial, rt));
    }
    out
}

/// Write a synthetic dataset under `root`; returns the number of events files.
pub fn write_synthetic(root: &Path, spec: &SyntheticSpec) -> BidsResult<usize> {
    write_file(root, "dataset_description.json", "{\"Name\": \"Synthetic\", \"BIDSVersion\": \"1.8.0\"}")?;
    let mut participants = String::from("participant_id\tage\n");
    let mut written = 0usize;
    for s in 1..=spec.subjects {
        let sub = format!("{:02}", s);
        participants.push_str(&format!("sub-{}\t{}\n", sub, 20 + mix(s as u64) % 40));
        let sessions: Vec<Option<String>> =
            if spec.sessions == 0 { vec![None] } else { (1..=spec.sessions).map(|n| Some(format!("{:02}", n))).collect() };
        for ses in &sessions {
            let (dir, prefix) = match ses {
                Some(ses) => (format!("sub-{}/ses-{}/func", sub, ses), format!("sub-{}_ses-{}", sub, ses)),
                None => (format!("sub-{}/func", sub), format!("sub-{}", sub)),
            };
            for task in &spec.tasks {
                for run in 1..=spec.runs.max(1) {
                    let name = format!("{}_task-{}_run-{:02}_events.tsv", prefix, task, run);
                    let seed = mix((s * 1000 + run) as u64 ^ written as u64);
                    write_file(root, &format!("{}/{}", dir, name), &events_body(seed, spec.rows_per_file))?;
                    written += 1;
                }
                let sidecar = format!("{}/{}_task-{}_bold.json", dir, prefix, task);
                write_file(root, &sidecar, &format!("{{\"RepetitionTime\": 2.0, \"TaskName\": \"{}\"}}", task))?;
            }
        }
    }
    write_file(root, "participants.tsv", &participants)?;
    info!(target: "bids_duckdb::bench", "wrote synthetic dataset: {} events files under {}", written, root.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_layout() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path()).unwrap();
        assert!(tmp.path().join("participants.tsv").is_file());
        assert!(tmp.path().join("sub-02/ses-pre/func/sub-02_ses-pre_task-rest_run-01_events.tsv").is_file());
    }

    #[test]
    fn synthetic_file_count_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = SyntheticSpec { subjects: 2, sessions: 0, runs: 1, tasks: vec!["rest".into()], rows_per_file: 4 };
        assert_eq!(write_synthetic(tmp.path(), &spec).unwrap(), spec.file_count());
        let body = fs::read_to_string(tmp.path().join("sub-02/func/sub-02_task-rest_run-01_events.tsv")).unwrap();
        assert_eq!(body.lines().count(), 5);
    }
}
