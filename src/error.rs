//! Unified error model for loaders, the engine boundary and the benchmark suite.
//! Library calls fail with `BidsError` at the point of the failing call
//! (construction, load or query); the benchmark suite folds these into its
//! result records instead of raising.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BidsError {
    #[error("BIDS root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("no files found matching pattern '{pattern}'")]
    NoMatchingFiles { pattern: String },
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("unknown scan handle: {0}")]
    UnknownScanHandle(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Engine(#[from] duckdb::Error),
    #[error(transparent)]
    Frame(#[from] polars::error::PolarsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl BidsError {
    pub fn code_str(&self) -> &'static str {
        match self {
            BidsError::RootNotFound(_) => "root_not_found",
            BidsError::NoMatchingFiles { .. } => "no_matching_files",
            BidsError::InvalidIdentifier(_) => "invalid_identifier",
            BidsError::UnknownStrategy(_) => "unknown_strategy",
            BidsError::UnknownScanHandle(_) => "unknown_scan_handle",
            BidsError::Schema(_) => "schema_error",
            BidsError::Config(_) => "config_error",
            BidsError::Engine(_) => "engine_error",
            BidsError::Frame(_) => "frame_error",
            BidsError::Io(_) => "io_error",
            BidsError::Json(_) => "json_error",
            BidsError::Yaml(_) => "yaml_error",
        }
    }

    /// True for failures caused by caller input rather than data or engine state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BidsError::RootNotFound(_)
                | BidsError::InvalidIdentifier(_)
                | BidsError::UnknownStrategy(_)
                | BidsError::Config(_)
        )
    }
}

pub type BidsResult<T> = Result<T, BidsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping() {
        assert_eq!(BidsError::RootNotFound(PathBuf::from("/x")).code_str(), "root_not_found");
        assert_eq!(BidsError::NoMatchingFiles { pattern: "*.tsv".into() }.code_str(), "no_matching_files");
        assert_eq!(BidsError::UnknownStrategy("foo".into()).code_str(), "unknown_strategy");
        assert_eq!(BidsError::Schema("bad".into()).code_str(), "schema_error");
    }

    #[test]
    fn user_errors_are_flagged() {
        assert!(BidsError::UnknownStrategy("foo".into()).is_user_error());
        assert!(BidsError::InvalidIdentifier("a b".into()).is_user_error());
        assert!(!BidsError::NoMatchingFiles { pattern: "x".into() }.is_user_error());
    }

    #[test]
    fn messages_name_the_input() {
        let e = BidsError::NoMatchingFiles { pattern: "/data/**/*.tsv".into() };
        assert_eq!(e.to_string(), "no files found matching pattern '/data/**/*.tsv'");
        let e = BidsError::RootNotFound(PathBuf::from("/nonexistent/path"));
        assert!(e.to_string().contains("/nonexistent/path"));
    }
}
