// src/errors.rs

//! Crate-wide error aliases and the job-scoped error taxonomy.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Terminal, job-scoped failure. None of these affect other jobs.
///
/// Messages are kept as strings so the error can be cloned into events and
/// serialized for the host.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    #[error("{}", spawn_failure_message(program, *executable_missing, message))]
    SpawnFailure {
        program: String,
        executable_missing: bool,
        message: String,
    },

    #[error("worker exited with code {code}")]
    WorkerNonZeroExit { code: i32 },

    #[error("worker exited successfully but printed no JSON_OUTPUT_PATH marker")]
    MarkerNotFound,

    #[error("result file not found at {}", path.display())]
    ResultFileMissing { path: PathBuf },

    #[error("failed to parse result file {}: {message}", path.display())]
    ResultParseError { path: PathBuf, message: String },

    #[error("supervising worker failed: {message}")]
    Supervision { message: String },
}

impl JobError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::SpawnFailure { .. } => "spawn_failure",
            JobError::WorkerNonZeroExit { .. } => "worker_non_zero_exit",
            JobError::MarkerNotFound => "marker_not_found",
            JobError::ResultFileMissing { .. } => "result_file_missing",
            JobError::ResultParseError { .. } => "result_parse_error",
            JobError::Supervision { .. } => "supervision",
        }
    }

    pub(crate) fn spawn(program: &str, err: &std::io::Error) -> Self {
        JobError::SpawnFailure {
            program: program.to_string(),
            executable_missing: err.kind() == std::io::ErrorKind::NotFound,
            message: err.to_string(),
        }
    }
}

fn spawn_failure_message(program: &str, executable_missing: bool, message: &str) -> String {
    if executable_missing {
        format!(
            "failed to start worker: executable '{program}' was not found ({message}); \
             check that it is installed and on the PATH visible to this process"
        )
    } else {
        format!("failed to start worker '{program}': {message}")
    }
}

pub type Result<T> = std::result::Result<T, WorkerwatchError>;
