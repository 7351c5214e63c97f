// src/resolve/mod.rs

//! Result resolution for jobs whose worker exited with code 0.
//!
//! The worker announces its artifact with a `JSON_OUTPUT_PATH:<path>` line on
//! stdout. [`resolve`] finds the last such marker in the captured stdout,
//! reads the file and parses it as a JSON object. The payload itself is
//! opaque here; [`summary`] offers a lenient read-only view for hosts.

pub mod summary;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::errors::JobError;
use crate::fs::FileSystem;
use crate::protocol::RESULT_PREFIX;

pub use summary::ReportSummary;

/// Parsed artifact of a successful job. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub artifact_path: PathBuf,
    pub content: serde_json::Value,
}

impl AnalysisResult {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_value(&self.content)
    }
}

/// Path declared by the last `JSON_OUTPUT_PATH:` marker in `stdout`.
///
/// The marker may appear anywhere in the stream, including mid-line.
pub fn find_result_path(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .rev()
        .filter_map(|line| line.rfind(RESULT_PREFIX).map(|idx| &line[idx + RESULT_PREFIX.len()..]))
        .map(str::trim)
        .find(|path| !path.is_empty())
}

/// Locate, read and parse the result file announced in `stdout`.
///
/// Relative paths are resolved against `base_dir` (the worker's working
/// directory) when one is given.
pub fn resolve(
    stdout: &str,
    base_dir: Option<&Path>,
    fs: &dyn FileSystem,
) -> Result<AnalysisResult, JobError> {
    let declared = find_result_path(stdout).ok_or(JobError::MarkerNotFound)?;

    let path = match base_dir {
        Some(base) if Path::new(declared).is_relative() => base.join(declared),
        _ => PathBuf::from(declared),
    };
    debug!(path = %path.display(), "resolving result file");

    if !fs.is_file(&path) {
        return Err(JobError::ResultFileMissing { path });
    }

    let raw = fs.read_to_string(&path).map_err(|e| JobError::ResultParseError {
        path: path.clone(),
        message: format!("{e:#}"),
    })?;

    let content: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| JobError::ResultParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;

    if !content.is_object() {
        return Err(JobError::ResultParseError {
            path,
            message: "expected a JSON object at the top level".to_string(),
        });
    }

    Ok(AnalysisResult {
        artifact_path: path,
        content,
    })
}
