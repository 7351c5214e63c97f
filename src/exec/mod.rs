// src/exec/mod.rs

//! Process orchestration layer.
//!
//! This module is responsible for actually running the worker, using
//! `tokio::process::Command`, and reporting back to the host through an
//! [`EventSink`].
//!
//! - [`command`] describes the worker invocation.
//! - [`registry`] is the shared map of in-flight jobs.
//! - [`supervisor`] spawns jobs, registers them and exposes cancellation.
//! - [`job_runner`] drives one job: stream readers, exit, result resolution.
//!   It also keeps the job's transcript.
//! - [`cancel`] terminates a worker together with its descendants.
//! - [`sink`] provides the `EventSink` trait and a channel-backed sink.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

use crate::errors::JobError;
use crate::progress::ProgressState;
use crate::resolve::AnalysisResult;
use crate::types::{DiagnosticLevel, JobId, JobStatus, OutputStream};

pub mod cancel;
pub mod command;
pub mod job_runner;
pub mod registry;
pub mod sink;
pub mod supervisor;

pub use cancel::{CancelOutcome, CancellationController, TerminateOutcome};
pub use command::WorkerCommand;
pub use registry::JobRegistry;
pub use sink::{ChannelSink, EventSink};
pub use supervisor::{JobHandle, Supervisor, SupervisorOptions};

/// One line of worker output destined for the host's log view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub stream: OutputStream,
    pub level: Option<DiagnosticLevel>,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            OutputStream::Stdout => f.write_str(&self.text),
            OutputStream::Stderr => write!(f, "[stderr] {}", self.text),
        }
    }
}

/// Terminal outcome of a job. Produced exactly once per job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded(AnalysisResult),
    Failed(JobError),
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            JobOutcome::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        match self {
            JobOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Raw bytes a job's worker wrote, one buffer per stream.
///
/// Readers cut short by a cancellation leave their buffer empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Transcript {
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// What a job driver hands back once the job is over.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub transcript: Transcript,
}

/// Events delivered to hosts that prefer a stream over callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Log { job: JobId, line: LogLine },
    Progress { job: JobId, state: ProgressState },
    Terminal { job: JobId, outcome: JobOutcome },
}

impl JobEvent {
    pub fn job(&self) -> JobId {
        match self {
            JobEvent::Log { job, .. }
            | JobEvent::Progress { job, .. }
            | JobEvent::Terminal { job, .. } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Terminal { .. })
    }
}
